//! Built-in engine backends.
//!
//! Each backend wraps one serving binary. The binaries themselves are
//! external collaborators; only the launch arguments live here.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use super::{EngineBackend, ResourceClass};

/// A backend described by a launch-argument template.
struct ServingBackend {
    name: &'static str,
    program: &'static str,
    resource_class: ResourceClass,
    /// Flag the model path is passed under.
    model_flag: &'static str,
    /// Fixed arguments preceding the model flag.
    base_args: &'static [&'static str],
}

impl EngineBackend for ServingBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn resource_class(&self) -> ResourceClass {
        self.resource_class
    }

    fn command_identity(&self) -> &str {
        self.program
    }

    fn launch_command(&self, model_path: Option<&Path>, extra: &[(String, String)]) -> Command {
        let mut command = Command::new(self.program);
        command.args(self.base_args);
        if let Some(path) = model_path {
            command.arg(self.model_flag).arg(path);
        }
        for (key, value) in extra {
            command.arg(format!("--{}", key)).arg(value);
        }
        command
    }
}

/// All built-in backends.
pub fn all() -> Vec<Arc<dyn EngineBackend>> {
    vec![
        Arc::new(ServingBackend {
            name: "tensorflow",
            program: "tensorflow_model_server",
            resource_class: ResourceClass::GpuCapable,
            model_flag: "--model_base_path",
            base_args: &["--rest_api_port=8501"],
        }),
        Arc::new(ServingBackend {
            name: "pytorch",
            program: "torchserve",
            resource_class: ResourceClass::GpuCapable,
            model_flag: "--model-store",
            base_args: &["--start", "--disable-token-auth"],
        }),
        Arc::new(ServingBackend {
            name: "onnx",
            program: "onnxruntime_server",
            resource_class: ResourceClass::CpuOnly,
            model_flag: "--model_path",
            base_args: &[],
        }),
        Arc::new(ServingBackend {
            name: "llamacpp",
            program: "llama-server",
            resource_class: ResourceClass::GpuCapable,
            model_flag: "--model",
            base_args: &["--host", "127.0.0.1"],
        }),
    ]
}
