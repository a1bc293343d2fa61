//! Durable plugin registry.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::document::JsonDocument;

/// Plugin lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Installed,
    Active,
    Inactive,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// One installed plugin.
///
/// `permissions` is descriptive metadata recorded at install time; nothing
/// at this layer enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    pub version: String,
    pub permissions: BTreeSet<String>,
    pub entry_point: PathBuf,
    pub status: PluginStatus,
    pub pid: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginsDoc {
    plugins: BTreeMap<String, PluginRecord>,
}

/// JSON-backed store of plugin records.
pub struct PluginRegistry {
    doc: JsonDocument<PluginsDoc>,
}

impl PluginRegistry {
    pub fn open(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub fn register(&self, record: PluginRecord) -> Result<()> {
        self.doc
            .mutate(|doc| doc.plugins.insert(record.name.clone(), record))?;
        Ok(())
    }

    /// Returns false if the plugin is unknown.
    pub fn update_status(&self, name: &str, status: PluginStatus, pid: Option<u32>) -> Result<bool> {
        self.doc.mutate(|doc| match doc.plugins.get_mut(name) {
            Some(record) => {
                record.status = status;
                record.pid = pid;
                true
            }
            None => false,
        })
    }

    pub fn query(&self, name: &str) -> Result<Option<PluginRecord>> {
        self.doc.read(|doc| doc.plugins.get(name).cloned())
    }

    /// Remove a record entirely. Unlike models, uninstalled plugins leave
    /// no audit trail behind.
    pub fn remove(&self, name: &str) -> Result<Option<PluginRecord>> {
        self.doc.mutate(|doc| doc.plugins.remove(name))
    }

    pub fn list(&self) -> Result<Vec<PluginRecord>> {
        self.doc.read(|doc| doc.plugins.values().cloned().collect())
    }
}
