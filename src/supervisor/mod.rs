//! Worker process supervision.
//!
//! This module provides:
//! - OS process primitives (`process`)
//! - PID file records (`pidfile`)
//! - The supervisor itself (`lifecycle`)

pub mod lifecycle;
pub mod pidfile;
pub mod process;

pub use lifecycle::{EngineInstance, HealthReport, StartOutcome, StopOutcome, Supervisor};
pub use pidfile::{instance_key, PidRecord};
