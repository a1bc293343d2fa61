//! Supervised worker lifecycle.
//!
//! Start, stop, and health-check for engine worker processes, keyed by
//! `(engine_type, model_name)`. Every check-then-act sequence on a PID file
//! runs under an exclusive lock on the instance's lock file, so concurrent
//! invocations against the same on-disk state serialize instead of racing.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;

use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::defaults;
use crate::error::{Error, Result};
use crate::paths::StatePaths;
use crate::registry::{EngineStatus, EngineStatusRegistry, ModelRecord, ModelRegistry};
use crate::supervisor::pidfile::{self, PidRecord};
use crate::supervisor::process;

/// Outcome of a start request. `AlreadyRunning` is informational success,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            Self::Started { pid } | Self::AlreadyRunning { pid } => *pid,
        }
    }
}

/// Outcome of a stop request. `NotRunning` is informational success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    NotRunning,
}

/// Result of probing one supervised instance.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub key: String,
    pub status: EngineStatus,
    pub pid: Option<u32>,
    pub uptime: Option<Duration>,
}

/// A live view of one supervised instance, assembled from its PID record
/// plus an OS liveness probe.
#[derive(Debug, Clone)]
pub struct EngineInstance {
    pub key: String,
    pub engine_type: String,
    pub model_name: Option<String>,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub status: EngineStatus,
    pub log_path: PathBuf,
}

/// Exclusive lock on one instance's lock file. Released on drop.
struct InstanceLock {
    _file: File,
}

fn lock_instance(paths: &StatePaths, key: &str) -> Result<InstanceLock> {
    std::fs::create_dir_all(&paths.pid_dir)?;
    let file = File::create(paths.lock_file(key))?;
    file.lock_exclusive()
        .map_err(|e| Error::LockFailed(e.to_string()))?;
    Ok(InstanceLock { _file: file })
}

/// What to spawn for one supervised instance.
pub(crate) struct SpawnSpec<'a> {
    pub key: &'a str,
    pub engine_type: &'a str,
    pub model_name: Option<&'a str>,
    pub command: Command,
    pub identity: &'a str,
}

/// Start a supervised process.
///
/// Under the instance lock: trust a verified-live PID record (idempotent
/// no-op), discard a stale one, then spawn detached with output redirected
/// to the instance log and write the PID record once the worker has
/// confirmed liveness.
pub(crate) fn start_supervised(
    paths: &StatePaths,
    config: &Config,
    spec: SpawnSpec<'_>,
) -> Result<StartOutcome> {
    let _lock = lock_instance(paths, spec.key)?;
    let pid_path = paths.pid_file(spec.key);

    if let Some(record) = pidfile::read_record(&pid_path) {
        if process::pid_is_alive(record.pid)
            && process::pid_matches_identity(record.pid, &record.command_identity)
        {
            tracing::info!("{} already running with PID {}", spec.key, record.pid);
            return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
        }
        tracing::info!(
            "Removing stale PID file for {} (PID {} is gone)",
            spec.key,
            record.pid
        );
        pidfile::remove_record(&pid_path);
    } else if pid_path.exists() {
        // Unparsable leftover
        pidfile::remove_record(&pid_path);
    }

    let log_path = paths.log_file(spec.key);
    let log_file = File::create(&log_path)?;

    let mut command = spec.command;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file));

    tracing::info!("Launching {} worker; log at {}", spec.key, log_path.display());

    let mut child = command.spawn().map_err(|e| Error::ProcessSpawnFailure {
        engine_type: spec.engine_type.to_string(),
        reason: e.to_string(),
    })?;
    let pid = child.id();

    confirm_started(&mut child, spec.engine_type, config.startup_timeout())?;

    let record = PidRecord {
        pid,
        engine_type: spec.engine_type.to_string(),
        model_name: spec.model_name.map(str::to_string),
        command_identity: spec.identity.to_string(),
        started_at: Utc::now(),
    };
    pidfile::write_record(&pid_path, &record)?;

    tracing::info!("{} worker running with PID {}", spec.key, pid);
    Ok(StartOutcome::Started { pid })
}

/// Post-spawn liveness confirmation.
///
/// The worker must survive a short settle window; a worker that exits
/// during it is a spawn failure, not a crash to be discovered later. The
/// configured startup timeout bounds the whole wait.
fn confirm_started(child: &mut Child, engine_type: &str, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let settle = Duration::from_millis(defaults::SPAWN_SETTLE_MILLIS);

    loop {
        if let Some(status) = child.try_wait()? {
            return Err(Error::ProcessSpawnFailure {
                engine_type: engine_type.to_string(),
                reason: format!("worker exited during startup ({})", status),
            });
        }
        if started.elapsed() >= settle {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::HealthCheckTimeout(
                timeout.as_secs(),
                engine_type.to_string(),
            ));
        }
        std::thread::sleep(Duration::from_millis(defaults::LIVENESS_POLL_MILLIS));
    }
}

/// Stop a supervised process: graceful signal, bounded grace period,
/// forced kill if needed. Missing or stale PID files are a no-op.
pub(crate) fn stop_supervised(
    paths: &StatePaths,
    config: &Config,
    key: &str,
) -> Result<StopOutcome> {
    let _lock = lock_instance(paths, key)?;
    let pid_path = paths.pid_file(key);

    let record = match pidfile::read_record(&pid_path) {
        Some(record) => record,
        None => {
            if pid_path.exists() {
                pidfile::remove_record(&pid_path);
            }
            tracing::info!("{} is not running", key);
            return Ok(StopOutcome::NotRunning);
        }
    };

    if !process::pid_is_alive(record.pid)
        || !process::pid_matches_identity(record.pid, &record.command_identity)
    {
        tracing::info!(
            "{} has a stale PID file (PID {}); cleaning up",
            key,
            record.pid
        );
        pidfile::remove_record(&pid_path);
        return Ok(StopOutcome::NotRunning);
    }

    tracing::info!("Stopping {} (PID {})", key, record.pid);
    if !process::terminate_process(record.pid, config.stop_grace()) {
        return Err(Error::ShutdownFailed(record.pid));
    }
    process::reap_process(record.pid);
    pidfile::remove_record(&pid_path);

    Ok(StopOutcome::Stopped { pid: record.pid })
}

/// Probe one instance. With `heal`, a dead or identity-mismatched PID gets
/// its stale file deleted as a side effect.
pub(crate) fn probe_supervised(paths: &StatePaths, key: &str, heal: bool) -> Result<HealthReport> {
    let _lock = lock_instance(paths, key)?;
    let pid_path = paths.pid_file(key);

    let record = match pidfile::read_record(&pid_path) {
        Some(record) => record,
        None => {
            return Ok(HealthReport {
                key: key.to_string(),
                status: EngineStatus::Stopped,
                pid: None,
                uptime: None,
            })
        }
    };

    if process::pid_is_alive(record.pid)
        && process::pid_matches_identity(record.pid, &record.command_identity)
    {
        let uptime = (Utc::now() - record.started_at).to_std().unwrap_or_default();
        return Ok(HealthReport {
            key: key.to_string(),
            status: EngineStatus::Running,
            pid: Some(record.pid),
            uptime: Some(uptime),
        });
    }

    if heal {
        tracing::warn!(
            "{} is not alive behind PID {}; removing stale PID file",
            key,
            record.pid
        );
        pidfile::remove_record(&pid_path);
    }

    Ok(HealthReport {
        key: key.to_string(),
        status: EngineStatus::Crashed,
        pid: Some(record.pid),
        uptime: None,
    })
}

/// Orchestrates engine worker lifecycle against the backend catalog and the
/// durable registries.
pub struct Supervisor {
    paths: StatePaths,
    config: Config,
    backends: BackendRegistry,
    models: ModelRegistry,
    engines: EngineStatusRegistry,
}

impl Supervisor {
    pub fn new(paths: StatePaths, config: Config, backends: BackendRegistry) -> Result<Self> {
        paths.ensure_dirs()?;
        let models = ModelRegistry::open(&paths.models_registry);
        let engines = EngineStatusRegistry::open(&paths.engines_registry);
        Ok(Self {
            paths,
            config,
            backends,
            models,
            engines,
        })
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn engines(&self) -> &EngineStatusRegistry {
        &self.engines
    }

    /// Start an engine worker.
    pub fn start(
        &self,
        engine_type: &str,
        model_name: Option<&str>,
        extra: &[(String, String)],
    ) -> Result<StartOutcome> {
        let backend = self.backends.describe(engine_type)?;
        let model_path = model_name
            .map(|m| self.resolve_model_path(m))
            .transpose()?;
        let key = pidfile::instance_key(engine_type, model_name);

        let command = backend.launch_command(model_path.as_deref(), extra);
        let spec = SpawnSpec {
            key: &key,
            engine_type,
            model_name,
            command,
            identity: backend.command_identity(),
        };

        let outcome = match start_supervised(&self.paths, &self.config, spec) {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(
                    e,
                    Error::ProcessSpawnFailure { .. } | Error::HealthCheckTimeout(..)
                ) {
                    self.engines
                        .update_status(&key, EngineStatus::Crashed, None)?;
                }
                return Err(e);
            }
        };

        self.engines
            .update_status(&key, EngineStatus::Running, Some(outcome.pid()))?;
        if let (StartOutcome::Started { .. }, Some(model)) = (&outcome, model_name) {
            self.ensure_model_registered(model, engine_type)?;
            self.models.set_loaded(model, true)?;
        }
        Ok(outcome)
    }

    /// Register a model and start a worker serving it.
    ///
    /// Fails with `ModelNotFound` before touching the registry when the
    /// model path does not exist.
    pub fn load(&self, engine_type: &str, model: &str) -> Result<StartOutcome> {
        self.backends.describe(engine_type)?;
        self.resolve_model_path(model)?;
        self.ensure_model_registered(model, engine_type)?;
        self.start(engine_type, Some(model), &[])
    }

    /// Stop a model's worker and flip its record to unloaded.
    pub fn unload(&self, model: &str) -> Result<StopOutcome> {
        let record = self.models.query(model)?.ok_or_else(|| Error::ModelNotFound {
            name: model.to_string(),
            path: self.paths.models_dir.join(model).display().to_string(),
        })?;

        let outcome = self.stop(&record.engine_type, Some(model))?;
        self.models.set_loaded(model, false)?;
        Ok(outcome)
    }

    /// Stop one instance, or every instance of an engine type when the
    /// model is omitted. Idempotent.
    pub fn stop(&self, engine_type: &str, model_name: Option<&str>) -> Result<StopOutcome> {
        self.backends.describe(engine_type)?;

        let keys = match model_name {
            Some(model) => vec![pidfile::instance_key(engine_type, Some(model))],
            None => self.instance_keys(engine_type)?,
        };

        let mut last = StopOutcome::NotRunning;
        for key in &keys {
            let outcome = stop_supervised(&self.paths, &self.config, key)?;
            match outcome {
                StopOutcome::Stopped { .. } => {
                    self.engines.update_status(key, EngineStatus::Stopped, None)?;
                    last = outcome;
                }
                StopOutcome::NotRunning => {
                    // Only touch the status record if one exists; a stop of
                    // something never started should leave no trace.
                    if self.engines.query(key)?.is_some() {
                        self.engines.update_status(key, EngineStatus::Stopped, None)?;
                    }
                }
            }
        }
        Ok(last)
    }

    /// Probe one instance, or every instance of an engine type. Dead
    /// instances are reported `crashed` and their stale PID files removed.
    pub fn health_check(
        &self,
        engine_type: &str,
        model_name: Option<&str>,
    ) -> Result<Vec<HealthReport>> {
        self.backends.describe(engine_type)?;

        let keys = match model_name {
            Some(model) => vec![pidfile::instance_key(engine_type, Some(model))],
            None => {
                let keys = self.instance_keys(engine_type)?;
                if keys.is_empty() {
                    vec![engine_type.to_string()]
                } else {
                    keys
                }
            }
        };

        let mut reports = Vec::with_capacity(keys.len());
        for key in &keys {
            let report = probe_supervised(&self.paths, key, true)?;
            if report.status == EngineStatus::Crashed {
                self.engines.update_status(key, EngineStatus::Crashed, None)?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Snapshot of every supervised instance, probed but not healed.
    pub fn status(&self) -> Result<Vec<EngineInstance>> {
        let mut instances = Vec::new();
        for key in self.all_keys()? {
            let Some(record) = pidfile::read_record(&self.paths.pid_file(&key)) else {
                continue;
            };
            let alive = process::pid_is_alive(record.pid)
                && process::pid_matches_identity(record.pid, &record.command_identity);
            instances.push(EngineInstance {
                log_path: self.paths.log_file(&key),
                key,
                engine_type: record.engine_type,
                model_name: record.model_name,
                pid: record.pid,
                start_time: record.started_at,
                status: if alive {
                    EngineStatus::Running
                } else {
                    EngineStatus::Crashed
                },
            });
        }
        Ok(instances)
    }

    fn resolve_model_path(&self, model: &str) -> Result<PathBuf> {
        let path = match self.models.query(model)? {
            Some(record) => record.storage_path,
            None => self.paths.models_dir.join(model),
        };
        if !path.exists() {
            return Err(Error::ModelNotFound {
                name: model.to_string(),
                path: path.display().to_string(),
            });
        }
        Ok(path)
    }

    fn ensure_model_registered(&self, model: &str, engine_type: &str) -> Result<()> {
        if self.models.query(model)?.is_none() {
            let path = self.paths.models_dir.join(model);
            self.models
                .register(ModelRecord::new(model, engine_type, path))?;
        }
        Ok(())
    }

    fn instance_keys(&self, engine_type: &str) -> Result<Vec<String>> {
        let prefix = format!("{}-", engine_type);
        Ok(self
            .all_keys()?
            .into_iter()
            .filter(|key| {
                match pidfile::read_record(&self.paths.pid_file(key)) {
                    // Exact match on the recorded engine type; a filename
                    // prefix would also catch engines whose name is a
                    // prefix of another hyphenated key
                    Some(record) => record.engine_type == engine_type,
                    // Unparsable leftovers still match by name so stop can
                    // clean them up
                    None => key == engine_type || key.starts_with(&prefix),
                }
            })
            .collect())
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        match std::fs::read_dir(&self.paths.pid_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(stem) = name.strip_suffix(".pid") {
                        keys.push(stem.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        keys.sort();
        Ok(keys)
    }
}
