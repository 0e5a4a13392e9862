/*!
 * Memory Configuration
 *
 * Runtime configuration for the monitor and limiter polling loops
 */

use crate::core::limits::{
    DEFAULT_GC_MIN_INTERVAL, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL, HISTORY_WINDOW,
    MAX_APPLIED_THROTTLE_FACTOR, MIN_POLL_INTERVAL, MIN_THROTTLE_FACTOR, THROTTLE_RELAX_STEP,
};
use crate::core::serde::duration_secs;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Read and parse an environment variable, keeping `default` when unset or invalid
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparsable environment value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between background samples
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Bounded wait when stopping the background loop
    #[serde(with = "duration_secs")]
    pub join_timeout: Duration,
    /// Span of samples kept in history
    #[serde(with = "duration_secs")]
    pub history_window: Duration,
    /// Minimum spacing between requested collections
    #[serde(with = "duration_secs")]
    pub gc_min_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            history_window: HISTORY_WINDOW,
            gc_min_interval: DEFAULT_GC_MIN_INTERVAL,
        }
    }
}

impl MonitorConfig {
    /// Load overrides from `SEO_MEMORY_POLL_MS` and `SEO_MEMORY_JOIN_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let poll_ms = env_or(
            "SEO_MEMORY_POLL_MS",
            defaults.poll_interval.as_millis() as u64,
        );
        let join_ms = env_or(
            "SEO_MEMORY_JOIN_TIMEOUT_MS",
            defaults.join_timeout.as_millis() as u64,
        );
        defaults
            .with_poll_interval(Duration::from_millis(poll_ms))
            .with_join_timeout(Duration::from_millis(join_ms))
    }

    /// Set poll interval (clamped to a 10ms floor)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: Duration) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_gc_min_interval(mut self, interval: Duration) -> Self {
        self.gc_min_interval = interval;
        self
    }

    /// History capacity: `history_window / poll_interval`, at least one entry
    pub fn history_capacity(&self) -> usize {
        let interval = self.poll_interval.as_secs_f64();
        if interval <= 0.0 {
            return 1;
        }
        ((self.history_window.as_secs_f64() / interval) as usize).max(1)
    }
}

/// Limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Interval between threshold checks; also scales throttle delays
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    #[serde(with = "duration_secs")]
    pub join_timeout: Duration,
    /// Factor increase per quiet cycle
    pub relax_step: f64,
    /// Floor of the throttle factor
    pub min_factor: f64,
    /// Loosest factor a throttle threshold may apply
    pub max_applied_factor: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            relax_step: THROTTLE_RELAX_STEP,
            min_factor: MIN_THROTTLE_FACTOR,
            max_applied_factor: MAX_APPLIED_THROTTLE_FACTOR,
        }
    }
}

impl LimiterConfig {
    /// Load overrides from `SEO_MEMORY_POLL_MS`, `SEO_MEMORY_JOIN_TIMEOUT_MS`
    /// and `SEO_THROTTLE_RELAX_STEP`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let poll_ms = env_or(
            "SEO_MEMORY_POLL_MS",
            defaults.poll_interval.as_millis() as u64,
        );
        let join_ms = env_or(
            "SEO_MEMORY_JOIN_TIMEOUT_MS",
            defaults.join_timeout.as_millis() as u64,
        );
        let relax = env_or("SEO_THROTTLE_RELAX_STEP", defaults.relax_step);
        defaults
            .with_poll_interval(Duration::from_millis(poll_ms))
            .with_join_timeout(Duration::from_millis(join_ms))
            .with_relax_step(relax)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set relaxation step (clamped to (0, 1])
    pub fn with_relax_step(mut self, step: f64) -> Self {
        self.relax_step = if step.is_finite() && step > 0.0 {
            step.min(1.0)
        } else {
            THROTTLE_RELAX_STEP
        };
        self
    }
}
