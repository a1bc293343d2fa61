//! PID file records.
//!
//! One JSON file per supervised instance under the run directory. Besides
//! the PID itself the record carries the command identity and start time so
//! later invocations can tell a live worker from a reused process id.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk payload of a PID file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub engine_type: String,
    pub model_name: Option<String>,
    /// Program name recorded at spawn, for the PID-reuse guard.
    pub command_identity: String,
    pub started_at: DateTime<Utc>,
}

/// Read a PID record. An unparsable or empty file yields `None`; callers
/// treat that as stale bookkeeping.
pub fn read_record(path: &Path) -> Option<PidRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<PidRecord>(&content) {
        Ok(record) if record.pid > 0 => Some(record),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Unparsable PID file {}: {}", path.display(), e);
            None
        }
    }
}

/// Write a PID record atomically (temp file + rename).
pub fn write_record(path: &Path, record: &PidRecord) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, serde_json::to_string_pretty(record)?)?;
    fs::rename(&tmp_path, path)
}

/// Remove a PID file, tolerating its absence.
pub fn remove_record(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove PID file {}: {}", path.display(), e);
        }
    }
}

/// Instance key for an engine/model pair: `<engine>` or `<engine>-<model>`.
///
/// Model names may contain path separators (HF-style ids); those characters
/// are flattened so the key stays a single filename.
pub fn instance_key(engine_type: &str, model_name: Option<&str>) -> String {
    match model_name {
        Some(model) => {
            let sanitized: String = model
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("{}-{}", engine_type, sanitized)
        }
        None => engine_type.to_string(),
    }
}
