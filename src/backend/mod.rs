//! Engine backend catalog.
//!
//! Maps an engine-type identifier to how its worker is launched, how its
//! health is judged, and what resources it needs. Populated once at startup;
//! read-only afterwards.

pub mod builtin;

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};

/// Whether a backend can use an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceClass {
    CpuOnly,
    GpuCapable,
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CpuOnly => write!(f, "cpu"),
            Self::GpuCapable => write!(f, "gpu"),
        }
    }
}

/// Launch and health behavior for one engine type.
pub trait EngineBackend: Send + Sync {
    /// Engine-type identifier this backend serves.
    fn name(&self) -> &str;

    fn resource_class(&self) -> ResourceClass;

    /// Program name the supervisor expects to find behind a recorded PID.
    ///
    /// Used to tell a live worker apart from an unrelated process that
    /// reused its process id.
    fn command_identity(&self) -> &str;

    /// Build the serving command, with or without a model to serve.
    ///
    /// `extra` carries opaque `key=value` pairs from the caller, appended
    /// as `--key value` arguments.
    fn launch_command(&self, model_path: Option<&Path>, extra: &[(String, String)]) -> Command;
}

impl std::fmt::Debug for dyn EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBackend")
            .field("name", &self.name())
            .finish()
    }
}

/// Read-only lookup of registered backends.
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn EngineBackend>>,
}

impl BackendRegistry {
    /// An empty registry. Tests register their own backends into this.
    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// A registry populated with the built-in backends.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for backend in builtin::all() {
            registry.register(backend);
        }
        registry
    }

    /// Register a backend under its own name. Last registration wins.
    pub fn register(&mut self, backend: Arc<dyn EngineBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Look up a backend by engine type.
    pub fn describe(&self, engine_type: &str) -> Result<&Arc<dyn EngineBackend>> {
        self.backends
            .get(engine_type)
            .ok_or_else(|| Error::UnknownEngineType(engine_type.to_string()))
    }

    /// Engine types in registration order (sorted by name).
    pub fn engine_types(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let registry = BackendRegistry::builtin();
        let types = registry.engine_types();
        assert!(types.contains(&"tensorflow"));
        assert!(types.contains(&"onnx"));

        let backend = registry.describe("tensorflow").unwrap();
        assert_eq!(backend.name(), "tensorflow");
    }

    #[test]
    fn test_unknown_engine_type() {
        let registry = BackendRegistry::builtin();
        let err = registry.describe("theano").unwrap_err();
        assert!(matches!(err, Error::UnknownEngineType(_)));
    }

    #[test]
    fn test_describe_has_no_side_effects() {
        let registry = BackendRegistry::builtin();
        let before = registry.engine_types().len();
        let _ = registry.describe("nope");
        assert_eq!(registry.engine_types().len(), before);
    }
}
