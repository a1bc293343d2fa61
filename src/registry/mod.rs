//! Durable JSON-backed registries.
//!
//! This module provides:
//! - Model records (`models`)
//! - Engine/plugin status records (`engines`)
//! - Plugin install metadata (`plugins`)
//!
//! All three serialize writers through an exclusive file lock and write
//! atomically via temp-file-plus-rename (`document`).

mod document;
pub mod engines;
pub mod models;
pub mod plugins;

pub use engines::{EngineStatus, EngineStatusRegistry, StatusRecord};
pub use models::{ModelRecord, ModelRegistry};
pub use plugins::{PluginRecord, PluginRegistry, PluginStatus};
