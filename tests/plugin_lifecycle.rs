//! Plugin install/start/stop/uninstall against real processes.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use grove::registry::{EngineStatus, PluginStatus};
use grove::{Config, Error, PluginManager, StartOutcome, StatePaths, StopOutcome};

fn manager(dir: &tempfile::TempDir) -> PluginManager {
    let config = Config {
        stop_grace_secs: 2,
        ..Config::default()
    };
    PluginManager::new(StatePaths::in_dir(dir.path()), config).unwrap()
}

/// An executable single-file bundle that idles until signalled.
fn idle_bundle(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, "#!/bin/sh\nsleep 300\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[test]
fn full_plugin_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "echoer.sh");
    let plugins = manager(&dir);

    let record = plugins
        .install(&bundle, Some("echoer"), None, "1.0.0", ["fs".to_string()])
        .unwrap();
    assert_eq!(record.status, PluginStatus::Installed);

    let outcome = plugins.start("echoer").unwrap();
    let StartOutcome::Started { pid } = outcome else {
        panic!("fresh plugin must spawn");
    };

    let record = plugins.plugins().query("echoer").unwrap().unwrap();
    assert_eq!(record.status, PluginStatus::Active);
    assert_eq!(record.pid, Some(pid));

    // Second start is an idempotent no-op
    let again = plugins.start("echoer").unwrap();
    assert_eq!(again, StartOutcome::AlreadyRunning { pid });

    let (_, report) = plugins.status("echoer").unwrap();
    assert_eq!(report.status, EngineStatus::Running);

    let stopped = plugins.stop("echoer").unwrap();
    assert_eq!(stopped, StopOutcome::Stopped { pid });

    let record = plugins.plugins().query("echoer").unwrap().unwrap();
    assert_eq!(record.status, PluginStatus::Inactive);
    assert_eq!(record.pid, None);

    plugins.uninstall("echoer").unwrap();
    assert!(plugins.list().unwrap().is_empty());
}

#[test]
fn uninstall_stops_a_running_plugin_first() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "daemonish.sh");
    let plugins = manager(&dir);

    plugins
        .install(&bundle, Some("daemonish"), None, "0.1.0", [])
        .unwrap();
    let pid = plugins.start("daemonish").unwrap().pid();

    plugins.uninstall("daemonish").unwrap();

    // Worker is gone along with its PID file and directory
    std::thread::sleep(std::time::Duration::from_millis(200));
    assert!(!grove::supervisor::process::pid_is_alive(pid));
    assert!(!dir.path().join("plugins/daemonish").exists());
    assert!(!dir.path().join("run/plugin-daemonish.pid").exists());
}

#[test]
fn install_rejects_names_that_escape_the_plugins_dir() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "sneaky.sh");
    let plugins = manager(&dir);

    // A sibling of plugins/ that a traversal-shaped name would point at
    let victim = dir.path().join("victim");
    std::fs::create_dir_all(&victim).unwrap();
    std::fs::write(victim.join("precious.txt"), "keep me").unwrap();

    for name in ["../victim", "..", "a/b", "a\\b", ".hidden", ""] {
        let err = plugins
            .install(&bundle, Some(name), None, "0.1.0", [])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPluginName(_)), "name {:?}", name);
    }

    assert!(victim.join("precious.txt").exists());
    assert!(plugins.list().unwrap().is_empty());
}

#[test]
fn reinstall_stops_the_running_worker_first() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "fresh.sh");
    let plugins = manager(&dir);

    plugins.install(&bundle, Some("fresh"), None, "1.0.0", []).unwrap();
    let pid = plugins.start("fresh").unwrap().pid();

    let record = plugins
        .install(&bundle, Some("fresh"), None, "1.1.0", [])
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(200));
    assert!(!grove::supervisor::process::pid_is_alive(pid));
    assert!(!dir.path().join("run/plugin-fresh.pid").exists());
    assert_eq!(record.status, PluginStatus::Installed);
    assert_eq!(record.version, "1.1.0");
}

#[test]
fn stop_is_idempotent_for_never_started_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "lazy.sh");
    let plugins = manager(&dir);

    plugins.install(&bundle, Some("lazy"), None, "0.1.0", []).unwrap();
    assert_eq!(plugins.stop("lazy").unwrap(), StopOutcome::NotRunning);
}

#[test]
fn permissions_are_recorded_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = idle_bundle(&dir, "scoped.sh");
    let plugins = manager(&dir);

    let record = plugins
        .install(
            &bundle,
            Some("scoped"),
            None,
            "2.0.0",
            ["net".to_string(), "fs:read".to_string()],
        )
        .unwrap();

    assert!(record.permissions.contains("net"));
    assert!(record.permissions.contains("fs:read"));
}
