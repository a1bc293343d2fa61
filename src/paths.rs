//! Filesystem layout for supervisor state.

use std::path::PathBuf;

/// File and directory paths used by the supervisor and registries.
///
/// Everything lives under a single state root so tests can point the whole
/// stack at a temp directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub log_dir: PathBuf,
    pub models_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub models_registry: PathBuf,
    pub engines_registry: PathBuf,
    pub plugins_registry: PathBuf,
}

impl StatePaths {
    /// Paths rooted at the user's local data directory.
    pub fn new() -> Self {
        let state_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("grove");
        Self::in_dir(state_dir)
    }

    /// Paths rooted at an explicit directory.
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            pid_dir: state_dir.join("run"),
            log_dir: state_dir.join("logs"),
            models_dir: state_dir.join("models"),
            plugins_dir: state_dir.join("plugins"),
            models_registry: state_dir.join("models.json"),
            engines_registry: state_dir.join("engines.json"),
            plugins_registry: state_dir.join("plugins.json"),
            state_dir,
        }
    }

    /// Create every directory this layout needs.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.state_dir,
            &self.pid_dir,
            &self.log_dir,
            &self.models_dir,
            &self.plugins_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// PID file for a supervised instance.
    pub fn pid_file(&self, key: &str) -> PathBuf {
        self.pid_dir.join(format!("{}.pid", key))
    }

    /// Lock file guarding an instance's start/stop/health sequences.
    pub fn lock_file(&self, key: &str) -> PathBuf {
        self.pid_dir.join(format!("{}.lock", key))
    }

    /// Log file a supervised instance's output is redirected to.
    pub fn log_file(&self, key: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", key))
    }
}

impl Default for StatePaths {
    fn default() -> Self {
        Self::new()
    }
}
