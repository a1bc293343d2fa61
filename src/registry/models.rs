//! Durable model registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::document::JsonDocument;

/// One known model. Records are kept for audit and never physically
/// deleted; `unload` only toggles the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub engine_type: String,
    pub storage_path: PathBuf,
    pub loaded: bool,
    pub load_timestamp: Option<DateTime<Utc>>,
    pub unload_timestamp: Option<DateTime<Utc>>,
}

impl ModelRecord {
    pub fn new(name: &str, engine_type: &str, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            engine_type: engine_type.to_string(),
            storage_path: storage_path.into(),
            loaded: false,
            load_timestamp: None,
            unload_timestamp: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModelsDoc {
    models: BTreeMap<String, ModelRecord>,
}

/// JSON-backed store of model records.
pub struct ModelRegistry {
    doc: JsonDocument<ModelsDoc>,
}

impl ModelRegistry {
    pub fn open(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    /// Insert or replace a record.
    pub fn register(&self, record: ModelRecord) -> Result<()> {
        self.doc
            .mutate(|doc| doc.models.insert(record.name.clone(), record))?;
        Ok(())
    }

    /// Flip the loaded flag, stamping the matching timestamp.
    ///
    /// Returns false if the model is unknown.
    pub fn set_loaded(&self, name: &str, loaded: bool) -> Result<bool> {
        self.doc.mutate(|doc| match doc.models.get_mut(name) {
            Some(record) => {
                record.loaded = loaded;
                if loaded {
                    record.load_timestamp = Some(Utc::now());
                } else {
                    record.unload_timestamp = Some(Utc::now());
                }
                true
            }
            None => false,
        })
    }

    pub fn query(&self, name: &str) -> Result<Option<ModelRecord>> {
        self.doc.read(|doc| doc.models.get(name).cloned())
    }

    /// All records, optionally filtered by engine type.
    pub fn list(&self, engine_type: Option<&str>) -> Result<Vec<ModelRecord>> {
        self.doc.read(|doc| {
            doc.models
                .values()
                .filter(|r| engine_type.map_or(true, |e| r.engine_type == e))
                .cloned()
                .collect()
        })
    }
}
