//! Grove - supervisor for long-lived inference engine worker processes.
//!
//! Starts, stops, and health-checks engine and plugin workers via PID
//! files, and tracks which models and plugins are loaded in durable
//! JSON registries.

mod defaults;
pub mod error;

pub mod backend;
pub mod config;
pub mod monitor;
pub mod paths;
pub mod plugin;
pub mod registry;
pub mod supervisor;

pub use error::{Error, Result};

pub use backend::{BackendRegistry, EngineBackend, ResourceClass};
pub use config::Config;
pub use monitor::{check_thresholds, Limits, MetricsSource, ProcSource, ResourceSample};
pub use paths::StatePaths;
pub use plugin::PluginManager;
pub use registry::{
    EngineStatus, EngineStatusRegistry, ModelRecord, ModelRegistry, PluginRecord, PluginRegistry,
    PluginStatus, StatusRecord,
};
pub use supervisor::{EngineInstance, HealthReport, StartOutcome, StopOutcome, Supervisor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
