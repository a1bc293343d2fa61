//! Default values for supervision timing and resource thresholds.

/// Overall cap on the post-spawn confirmation wait.
pub const STARTUP_TIMEOUT_SECS: u64 = 30;
pub const STOP_GRACE_SECS: u64 = 10;
pub const LIVENESS_POLL_MILLIS: u64 = 100;
/// Window a spawned worker must survive before it counts as running.
pub const SPAWN_SETTLE_MILLIS: u64 = 500;

pub const CPU_LIMIT_PCT: f64 = 80.0;
pub const MEM_LIMIT_PCT: f64 = 85.0;
pub const GPU_LIMIT_PCT: f64 = 90.0;
