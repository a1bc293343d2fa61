//! End-to-end supervisor lifecycle tests against real OS processes.
//!
//! A test backend launching `/bin/sleep` stands in for an inference engine
//! serving binary; everything else is the real stack on a temp state dir.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use grove::backend::{BackendRegistry, EngineBackend, ResourceClass};
use grove::registry::EngineStatus;
use grove::{Config, Error, StartOutcome, StatePaths, StopOutcome, Supervisor};

struct SleepBackend;

impl EngineBackend for SleepBackend {
    fn name(&self) -> &str {
        "sleeper"
    }

    fn resource_class(&self) -> ResourceClass {
        ResourceClass::CpuOnly
    }

    fn command_identity(&self) -> &str {
        "sleep"
    }

    fn launch_command(&self, _model_path: Option<&Path>, _extra: &[(String, String)]) -> Command {
        let mut command = Command::new("sleep");
        command.arg("300");
        command
    }
}

/// Backend whose worker exits immediately.
struct FalseBackend;

impl EngineBackend for FalseBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn resource_class(&self) -> ResourceClass {
        ResourceClass::CpuOnly
    }

    fn command_identity(&self) -> &str {
        "false"
    }

    fn launch_command(&self, _model_path: Option<&Path>, _extra: &[(String, String)]) -> Command {
        Command::new("false")
    }
}

/// Idling backend under a caller-chosen engine name.
struct NamedSleepBackend(&'static str);

impl EngineBackend for NamedSleepBackend {
    fn name(&self) -> &str {
        self.0
    }

    fn resource_class(&self) -> ResourceClass {
        ResourceClass::CpuOnly
    }

    fn command_identity(&self) -> &str {
        "sleep"
    }

    fn launch_command(&self, _model_path: Option<&Path>, _extra: &[(String, String)]) -> Command {
        let mut command = Command::new("sleep");
        command.arg("300");
        command
    }
}

fn test_backends() -> BackendRegistry {
    let mut backends = BackendRegistry::empty();
    backends.register(Arc::new(SleepBackend));
    backends.register(Arc::new(FalseBackend));
    backends.register(Arc::new(NamedSleepBackend("net")));
    backends.register(Arc::new(NamedSleepBackend("net-lite")));
    backends
}

fn supervisor(dir: &tempfile::TempDir) -> Supervisor {
    let paths = StatePaths::in_dir(dir.path());
    let config = Config {
        stop_grace_secs: 2,
        ..Config::default()
    };
    Supervisor::new(paths, config, test_backends()).unwrap()
}

fn seed_model(dir: &tempfile::TempDir, name: &str) {
    let models_dir = dir.path().join("models");
    std::fs::create_dir_all(&models_dir).unwrap();
    std::fs::write(models_dir.join(name), "weights").unwrap();
}

fn kill_hard(pid: u32) {
    Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .status()
        .unwrap();
    // Give the kernel a moment to tear the process down
    std::thread::sleep(std::time::Duration::from_millis(200));
}

#[test]
fn start_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "m1");
    let supervisor = supervisor(&dir);

    let first = supervisor.start("sleeper", Some("m1"), &[]).unwrap();
    let StartOutcome::Started { pid } = first else {
        panic!("first start must spawn");
    };

    let second = supervisor.start("sleeper", Some("m1"), &[]).unwrap();
    assert_eq!(second, StartOutcome::AlreadyRunning { pid });

    // Exactly one live process, exactly one PID file
    assert!(supervisor.paths().pid_file("sleeper-m1").exists());
    assert_eq!(supervisor.status().unwrap().len(), 1);

    supervisor.stop("sleeper", Some("m1")).unwrap();
}

#[test]
fn stop_without_pid_file_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(&dir);

    let outcome = supervisor.stop("sleeper", Some("ghost")).unwrap();
    assert_eq!(outcome, StopOutcome::NotRunning);
}

#[test]
fn stop_removes_pid_file_and_records_stopped() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "m2");
    let supervisor = supervisor(&dir);

    let outcome = supervisor.start("sleeper", Some("m2"), &[]).unwrap();
    let pid = outcome.pid();

    let stopped = supervisor.stop("sleeper", Some("m2")).unwrap();
    assert_eq!(stopped, StopOutcome::Stopped { pid });
    assert!(!supervisor.paths().pid_file("sleeper-m2").exists());

    let record = supervisor.engines().query("sleeper-m2").unwrap().unwrap();
    assert_eq!(record.status, EngineStatus::Stopped);

    let reports = supervisor.health_check("sleeper", Some("m2")).unwrap();
    assert_eq!(reports[0].status, EngineStatus::Stopped);
}

#[test]
fn health_check_heals_stale_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "m3");
    let supervisor = supervisor(&dir);

    let pid = supervisor.start("sleeper", Some("m3"), &[]).unwrap().pid();
    kill_hard(pid);

    let reports = supervisor.health_check("sleeper", Some("m3")).unwrap();
    assert_eq!(reports[0].status, EngineStatus::Crashed);
    assert_eq!(reports[0].pid, Some(pid));
    assert!(!supervisor.paths().pid_file("sleeper-m3").exists());

    // A subsequent start spawns a fresh worker
    let outcome = supervisor.start("sleeper", Some("m3"), &[]).unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    assert_eq!(supervisor.status().unwrap().len(), 1);

    supervisor.stop("sleeper", Some("m3")).unwrap();
}

#[test]
fn start_after_externally_killed_worker_spawns_fresh() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "m4");
    let supervisor = supervisor(&dir);

    let first_pid = supervisor.start("sleeper", Some("m4"), &[]).unwrap().pid();
    kill_hard(first_pid);

    let outcome = supervisor.start("sleeper", Some("m4"), &[]).unwrap();
    let StartOutcome::Started { pid } = outcome else {
        panic!("stale PID file must not count as running");
    };
    assert_ne!(pid, first_pid);

    supervisor.stop("sleeper", None).unwrap();
}

#[test]
fn unknown_engine_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(&dir);

    assert!(matches!(
        supervisor.start("theano", None, &[]),
        Err(Error::UnknownEngineType(_))
    ));
    assert!(matches!(
        supervisor.stop("theano", None),
        Err(Error::UnknownEngineType(_))
    ));
}

#[test]
fn load_with_missing_model_leaves_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(&dir);

    let err = supervisor.load("sleeper", "missing-model").unwrap_err();
    assert!(matches!(err, Error::ModelNotFound { .. }));

    assert!(supervisor.models().query("missing-model").unwrap().is_none());
    assert!(supervisor.models().list(None).unwrap().is_empty());
}

#[test]
fn load_and_unload_toggle_the_model_record() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "m5");
    let supervisor = supervisor(&dir);

    supervisor.load("sleeper", "m5").unwrap();
    let record = supervisor.models().query("m5").unwrap().unwrap();
    assert!(record.loaded);
    assert!(record.load_timestamp.is_some());

    supervisor.unload("m5").unwrap();
    let record = supervisor.models().query("m5").unwrap().unwrap();
    assert!(!record.loaded);
    assert!(record.unload_timestamp.is_some());
    // Records are audit history, never deleted
    assert_eq!(supervisor.models().list(None).unwrap().len(), 1);
}

#[test]
fn stop_without_model_stops_every_instance_of_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "a");
    seed_model(&dir, "b");
    let supervisor = supervisor(&dir);

    supervisor.start("sleeper", Some("a"), &[]).unwrap();
    supervisor.start("sleeper", Some("b"), &[]).unwrap();
    assert_eq!(supervisor.status().unwrap().len(), 2);

    supervisor.stop("sleeper", None).unwrap();
    assert_eq!(supervisor.status().unwrap().len(), 0);
}

#[test]
fn stop_does_not_touch_engines_whose_name_shares_a_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(&dir);

    supervisor.start("net", None, &[]).unwrap();
    let lite_pid = supervisor.start("net-lite", None, &[]).unwrap().pid();

    supervisor.stop("net", None).unwrap();

    // "net-lite" keys sort after "net-" and must survive a fan-out stop
    // of "net"
    assert!(supervisor.paths().pid_file("net-lite").exists());
    let reports = supervisor.health_check("net-lite", None).unwrap();
    assert_eq!(reports[0].status, EngineStatus::Running);
    assert_eq!(reports[0].pid, Some(lite_pid));
    assert!(!supervisor.paths().pid_file("net").exists());

    supervisor.stop("net-lite", None).unwrap();
}

#[test]
fn startup_timeout_below_settle_window_times_out() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "slowpoke");
    let paths = StatePaths::in_dir(dir.path());
    let config = Config {
        startup_timeout_secs: 0,
        stop_grace_secs: 2,
        ..Config::default()
    };
    let supervisor = Supervisor::new(paths, config, test_backends()).unwrap();

    let err = supervisor.start("sleeper", Some("slowpoke"), &[]).unwrap_err();
    assert!(matches!(err, Error::HealthCheckTimeout(..)));
    assert!(!supervisor.paths().pid_file("sleeper-slowpoke").exists());

    let record = supervisor.engines().query("sleeper-slowpoke").unwrap().unwrap();
    assert_eq!(record.status, EngineStatus::Crashed);
}

#[test]
fn worker_that_exits_during_startup_is_a_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(&dir);

    let err = supervisor.start("flaky", None, &[]).unwrap_err();
    assert!(matches!(err, Error::ProcessSpawnFailure { .. }));
    assert!(!supervisor.paths().pid_file("flaky").exists());

    let record = supervisor.engines().query("flaky").unwrap().unwrap();
    assert_eq!(record.status, EngineStatus::Crashed);
}

#[test]
fn concurrent_starts_yield_exactly_one_live_process() {
    let dir = tempfile::tempdir().unwrap();
    seed_model(&dir, "racy");

    let paths = StatePaths::in_dir(dir.path());
    let config = Config {
        stop_grace_secs: 2,
        ..Config::default()
    };

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let paths = paths.clone();
            let config = config.clone();
            std::thread::spawn(move || {
                let supervisor = Supervisor::new(paths, config, test_backends()).unwrap();
                supervisor.start("sleeper", Some("racy"), &[]).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<StartOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started { .. }))
        .count();
    assert_eq!(started, 1, "exactly one invocation may spawn");
    assert_eq!(outcomes[0].pid(), outcomes[1].pid());

    let supervisor = Supervisor::new(
        StatePaths::in_dir(dir.path()),
        Config::default(),
        test_backends(),
    )
    .unwrap();
    assert_eq!(supervisor.status().unwrap().len(), 1);
    supervisor.stop("sleeper", Some("racy")).unwrap();
}
