//! Resource monitoring.
//!
//! Samples CPU/memory/GPU utilization on demand and compares it against
//! configured thresholds. Violations are advisory only: they are logged,
//! never used to kill or throttle a worker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::Result;

/// A point-in-time utilization reading. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub gpu_pct: Option<f64>,
}

/// Advisory utilization thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub gpu_pct: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            cpu_pct: defaults::CPU_LIMIT_PCT,
            mem_pct: defaults::MEM_LIMIT_PCT,
            gpu_pct: defaults::GPU_LIMIT_PCT,
        }
    }
}

/// A threshold a sample exceeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub resource: &'static str,
    pub observed_pct: f64,
    pub limit_pct: f64,
}

impl std::fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {:.1}% exceeds limit {:.1}%",
            self.resource, self.observed_pct, self.limit_pct
        )
    }
}

/// Source of utilization readings.
///
/// Decouples the supervisor from whichever mechanism currently provides
/// the numbers; tests substitute a canned source.
pub trait MetricsSource: Send + Sync {
    fn sample(&self) -> Result<ResourceSample>;
}

/// Compare a sample against limits. Purely advisory.
pub fn check_thresholds(sample: &ResourceSample, limits: &Limits) -> Vec<ThresholdViolation> {
    let mut violations = Vec::new();

    if sample.cpu_pct > limits.cpu_pct {
        violations.push(ThresholdViolation {
            resource: "cpu",
            observed_pct: sample.cpu_pct,
            limit_pct: limits.cpu_pct,
        });
    }
    if sample.mem_pct > limits.mem_pct {
        violations.push(ThresholdViolation {
            resource: "memory",
            observed_pct: sample.mem_pct,
            limit_pct: limits.mem_pct,
        });
    }
    if let Some(gpu) = sample.gpu_pct {
        if gpu > limits.gpu_pct {
            violations.push(ThresholdViolation {
                resource: "gpu",
                observed_pct: gpu,
                limit_pct: limits.gpu_pct,
            });
        }
    }

    violations
}

/// Metrics source backed by the kernel's own counters.
///
/// On Linux this reads `/proc/stat` and `/proc/meminfo`. Elsewhere it
/// returns a zeroed sample. GPU utilization is not reported by this source.
pub struct ProcSource {
    /// Interval between the two CPU counter reads.
    cpu_window: Duration,
}

impl ProcSource {
    pub fn new() -> Self {
        Self {
            cpu_window: Duration::from_millis(200),
        }
    }
}

impl Default for ProcSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for ProcSource {
    #[cfg(target_os = "linux")]
    fn sample(&self) -> Result<ResourceSample> {
        let first = read_cpu_counters()?;
        std::thread::sleep(self.cpu_window);
        let second = read_cpu_counters()?;

        let busy = second.busy.saturating_sub(first.busy) as f64;
        let total = second.total.saturating_sub(first.total) as f64;
        let cpu_pct = if total > 0.0 { 100.0 * busy / total } else { 0.0 };

        Ok(ResourceSample {
            timestamp: Utc::now(),
            cpu_pct,
            mem_pct: read_mem_pct()?,
            gpu_pct: None,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn sample(&self) -> Result<ResourceSample> {
        tracing::debug!("No resource counters available on this platform; reporting zeros");
        let _ = self.cpu_window;
        Ok(ResourceSample {
            timestamp: Utc::now(),
            cpu_pct: 0.0,
            mem_pct: 0.0,
            gpu_pct: None,
        })
    }
}

#[cfg(target_os = "linux")]
struct CpuCounters {
    busy: u64,
    total: u64,
}

/// Parse the aggregate `cpu` line of /proc/stat.
#[cfg(target_os = "linux")]
fn read_cpu_counters() -> Result<CpuCounters> {
    let stat = std::fs::read_to_string("/proc/stat")?;
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .unwrap_or_default();

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();

    let total: u64 = fields.iter().sum();
    // Fields 3 and 4 are idle and iowait.
    let idle: u64 = fields.get(3).copied().unwrap_or(0) + fields.get(4).copied().unwrap_or(0);

    Ok(CpuCounters {
        busy: total.saturating_sub(idle),
        total,
    })
}

#[cfg(target_os = "linux")]
fn read_mem_pct() -> Result<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;

    let field = |name: &str| -> u64 {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };

    let total = field("MemTotal:");
    let available = field("MemAvailable:");
    if total == 0 {
        return Ok(0.0);
    }
    Ok(100.0 * (total.saturating_sub(available)) as f64 / total as f64)
}
