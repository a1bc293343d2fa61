//! Durable engine status registry.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::document::JsonDocument;

/// Last known lifecycle state of a supervised instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

/// Status entry for one engine instance or plugin, keyed by instance key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: EngineStatus,
    pub timestamp: DateTime<Utc>,
    pub pid: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EnginesDoc {
    engines: BTreeMap<String, StatusRecord>,
}

/// JSON-backed store of engine/plugin status records.
pub struct EngineStatusRegistry {
    doc: JsonDocument<EnginesDoc>,
}

impl EngineStatusRegistry {
    pub fn open(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub fn update_status(&self, key: &str, status: EngineStatus, pid: Option<u32>) -> Result<()> {
        self.doc.mutate(|doc| {
            doc.engines.insert(
                key.to_string(),
                StatusRecord {
                    status,
                    timestamp: Utc::now(),
                    pid,
                },
            );
        })
    }

    pub fn query(&self, key: &str) -> Result<Option<StatusRecord>> {
        self.doc.read(|doc| doc.engines.get(key).cloned())
    }

    /// Drop a status entry entirely (plugin uninstall).
    pub fn remove(&self, key: &str) -> Result<Option<StatusRecord>> {
        self.doc.mutate(|doc| doc.engines.remove(key))
    }

    pub fn list(&self) -> Result<Vec<(String, StatusRecord)>> {
        self.doc.read(|doc| {
            doc.engines
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }
}
