/*!
 * Memory Types
 * Snapshots, units, actions, and errors for resource monitoring
 */

use crate::core::serde::system_time_micros;
use crate::core::types::{format_bytes, Bytes, Pid, GIB, KIB, MIB};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Resource operation result
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Resource monitoring and limit errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ResourceError {
    #[error("Memory limit exceeded: usage {usage} bytes >= limit {limit} bytes ({action}: {description})")]
    #[diagnostic(
        code(memory::limit_exceeded),
        help("Reduce concurrent work, lower page batch sizes, or raise the threshold.")
    )]
    LimitExceeded {
        usage: Bytes,
        limit: Bytes,
        action: ThresholdAction,
        description: String,
    },

    #[error("Usage probe failed: {0}")]
    #[diagnostic(
        code(memory::probe_failed),
        help("Process statistics could not be read. The next poll will retry.")
    )]
    Probe(String),

    #[error("Invalid threshold: {0}")]
    #[diagnostic(
        code(memory::invalid_threshold),
        help("Limits must be positive; percent limits must be at most 100.")
    )]
    InvalidThreshold(String),

    #[error("Failed to spawn monitoring thread: {0}")]
    #[diagnostic(code(memory::spawn_failed))]
    Spawn(String),
}

/// Point-in-time process resource reading
///
/// Created by the monitor on each poll or on-demand query and never mutated
/// afterwards. Segment sizes are zero on platforms without `/proc/self/statm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageSnapshot {
    /// Resident set size
    pub rss: Bytes,
    /// Virtual memory size
    pub vms: Bytes,
    pub shared: Bytes,
    pub text: Bytes,
    pub data: Bytes,
    pub lib: Bytes,
    pub cpu_percent: f32,
    pub pid: Pid,
    pub num_threads: usize,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
}

impl ResourceUsageSnapshot {
    /// Snapshot carrying only an RSS figure (used by scripted probes)
    pub fn from_rss(rss: Bytes) -> Self {
        Self {
            rss,
            vms: rss,
            shared: 0,
            text: 0,
            data: 0,
            lib: 0,
            cpu_percent: 0.0,
            pid: std::process::id(),
            num_threads: 1,
            timestamp: SystemTime::now(),
        }
    }

    /// RSS in megabytes
    #[inline]
    pub fn rss_mb(&self) -> f64 {
        self.rss as f64 / MIB as f64
    }

    /// RSS as percentage of the given system memory
    pub fn rss_percent(&self, system_memory: Bytes) -> f64 {
        if system_memory == 0 {
            0.0
        } else {
            self.rss as f64 / system_memory as f64 * 100.0
        }
    }

    /// Classify RSS against system memory
    pub fn pressure(&self, system_memory: Bytes) -> MemoryPressure {
        MemoryPressure::from_percent(self.rss_percent(system_memory))
    }

    /// Signed RSS change from `earlier` to `self`
    #[inline]
    pub fn rss_delta_since(&self, earlier: &ResourceUsageSnapshot) -> i64 {
        self.rss as i64 - earlier.rss as i64
    }
}

impl fmt::Display for ResourceUsageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rss={} vms={} cpu={:.1}% threads={}",
            format_bytes(self.rss),
            format_bytes(self.vms),
            self.cpu_percent,
            self.num_threads
        )
    }
}

/// Aggregated usage over retained history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub current_rss: Bytes,
    pub peak_rss: Bytes,
    pub average_rss: Bytes,
    pub current_vms: Bytes,
    pub peak_vms: Bytes,
    pub average_vms: Bytes,
    pub samples: usize,
}

/// Memory pressure levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressure {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 95.0 {
            MemoryPressure::Critical
        } else if percent >= 80.0 {
            MemoryPressure::High
        } else if percent >= 60.0 {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemoryPressure::Low => write!(f, "LOW"),
            MemoryPressure::Medium => write!(f, "MEDIUM"),
            MemoryPressure::High => write!(f, "HIGH"),
            MemoryPressure::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Unit of a threshold limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryUnit {
    Bytes,
    Kb,
    Mb,
    Gb,
    /// Percent of total system memory
    Percent,
}

impl MemoryUnit {
    /// Convert a limit expressed in this unit to bytes
    pub fn to_bytes(self, limit: f64, system_memory: Bytes) -> Bytes {
        let bytes = match self {
            MemoryUnit::Bytes => limit,
            MemoryUnit::Kb => limit * KIB as f64,
            MemoryUnit::Mb => limit * MIB as f64,
            MemoryUnit::Gb => limit * GIB as f64,
            MemoryUnit::Percent => system_memory as f64 * limit / 100.0,
        };
        bytes.max(0.0).round() as Bytes
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryUnit::Bytes => "B",
            MemoryUnit::Kb => "KB",
            MemoryUnit::Mb => "MB",
            MemoryUnit::Gb => "GB",
            MemoryUnit::Percent => "%",
        };
        f.write_str(s)
    }
}

impl FromStr for MemoryUnit {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "bytes" => Ok(MemoryUnit::Bytes),
            "kb" | "k" => Ok(MemoryUnit::Kb),
            "mb" | "m" => Ok(MemoryUnit::Mb),
            "gb" | "g" => Ok(MemoryUnit::Gb),
            "%" | "percent" => Ok(MemoryUnit::Percent),
            other => Err(ResourceError::InvalidThreshold(format!(
                "unknown memory unit '{}'",
                other
            ))),
        }
    }
}

/// Action taken when a threshold is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAction {
    Warn,
    Error,
    Gc,
    Throttle,
    Abort,
}

impl ThresholdAction {
    pub const ALL: [ThresholdAction; 5] = [
        ThresholdAction::Warn,
        ThresholdAction::Error,
        ThresholdAction::Gc,
        ThresholdAction::Throttle,
        ThresholdAction::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdAction::Warn => "warn",
            ThresholdAction::Error => "error",
            ThresholdAction::Gc => "gc",
            ThresholdAction::Throttle => "throttle",
            ThresholdAction::Abort => "abort",
        }
    }

    /// Whether handling this action raises a limit failure
    pub fn is_failure(&self) -> bool {
        matches!(self, ThresholdAction::Error | ThresholdAction::Abort)
    }
}

impl fmt::Display for ThresholdAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdAction {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThresholdAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ResourceError::InvalidThreshold(format!("unknown action '{}'", s)))
    }
}

/// Outcome of a collection cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcReport {
    pub before: Option<ResourceUsageSnapshot>,
    pub after: Option<ResourceUsageSnapshot>,
    /// RSS released by the cycle (zero if usage grew)
    pub freed_bytes: Bytes,
    /// Items dropped by registered reclaimers
    pub reclaimed_items: usize,
    pub reclaimers_run: usize,
    #[serde(with = "crate::core::serde::duration_secs")]
    pub duration: Duration,
}

impl GcReport {
    /// Check if any memory or cached items were released
    pub fn freed_any(&self) -> bool {
        self.freed_bytes > 0 || self.reclaimed_items > 0
    }
}
