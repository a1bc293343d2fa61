//! Error types for Grove.

use thiserror::Error;

/// Grove error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine type is not present in the backend registry
    #[error("Unknown engine type '{0}'")]
    UnknownEngineType(String),

    /// Referenced model path does not exist on disk
    #[error("Model '{name}' not found at {path}")]
    ModelNotFound { name: String, path: String },

    /// Spawning the worker process failed
    #[error("Failed to spawn {engine_type} worker: {reason}")]
    ProcessSpawnFailure { engine_type: String, reason: String },

    /// Worker never confirmed liveness within the startup timeout
    #[error("Timed out after {0}s waiting for {1} worker to come up; check its log")]
    HealthCheckTimeout(u64, String),

    /// Graceful-then-forced termination failed to stop the process
    #[error("Failed to stop worker process {0}")]
    ShutdownFailed(u32),

    /// Failed to acquire an exclusive file lock
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),

    /// Plugin is not present in the plugin registry
    #[error("Plugin '{0}' is not installed")]
    PluginNotFound(String),

    /// Plugin name is not a single normal path component
    #[error("Invalid plugin name '{0}'")]
    InvalidPluginName(String),

    /// Plugin bundle had no usable entry point
    #[error("Plugin bundle at {0} has no executable entry point")]
    NoEntryPoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Grove operations.
pub type Result<T> = std::result::Result<T, Error>;
