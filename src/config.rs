//! Supervisor configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::Result;
use crate::monitor::Limits;

/// Tunable configuration, loadable from a JSON file.
///
/// Every field has a default so a missing or partial config file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on the post-spawn liveness confirmation. A worker is
    /// confirmed once it survives the settle window, so this only cuts the
    /// wait short (with `HealthCheckTimeout`) when set below that window.
    pub startup_timeout_secs: u64,
    /// Grace period between the polite stop signal and escalation.
    pub stop_grace_secs: u64,
    /// Advisory resource thresholds.
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            startup_timeout_secs: defaults::STARTUP_TIMEOUT_SECS,
            stop_grace_secs: defaults::STOP_GRACE_SECS,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Load from a JSON file, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
