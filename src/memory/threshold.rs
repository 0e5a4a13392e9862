/*!
 * Threshold Table
 * Ordered (limit, action, cooldown) rules evaluated against usage
 */

use super::types::{MemoryUnit, ResourceError, ResourceResult, ThresholdAction};
use crate::core::clock::SharedClock;
use crate::core::types::{format_bytes, Bytes};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Usage limit paired with an action and a cooldown
#[derive(Debug, Clone)]
pub struct Threshold {
    pub limit: f64,
    pub unit: MemoryUnit,
    pub action: ThresholdAction,
    pub cooldown: Duration,
    pub description: String,
    limit_bytes: Bytes,
    last_triggered: Option<Instant>,
}

impl Threshold {
    /// Build a threshold, resolving percent limits against `system_memory`
    pub fn new(
        limit: f64,
        unit: MemoryUnit,
        action: ThresholdAction,
        cooldown: Duration,
        description: impl Into<String>,
        system_memory: Bytes,
    ) -> ResourceResult<Self> {
        if !limit.is_finite() || limit <= 0.0 {
            return Err(ResourceError::InvalidThreshold(format!(
                "limit must be positive, got {}",
                limit
            )));
        }
        if unit == MemoryUnit::Percent && limit > 100.0 {
            return Err(ResourceError::InvalidThreshold(format!(
                "percent limit {} exceeds 100",
                limit
            )));
        }

        let mut description = description.into();
        if description.is_empty() {
            description = format!("{} at {}{}", action, limit, unit);
        }

        Ok(Self {
            limit,
            unit,
            action,
            cooldown,
            description,
            limit_bytes: unit.to_bytes(limit, system_memory),
            last_triggered: None,
        })
    }

    #[inline]
    pub fn limit_in_bytes(&self) -> Bytes {
        self.limit_bytes
    }

    pub fn last_triggered(&self) -> Option<Instant> {
        self.last_triggered
    }

    /// Check if the threshold fired less than `cooldown` ago
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        match self.last_triggered {
            Some(last) => now.saturating_duration_since(last) < self.cooldown,
            None => false,
        }
    }

    /// Check if `usage` reaches the limit and the threshold may fire
    pub fn is_exceeded(&self, usage: Bytes, now: Instant) -> bool {
        usage >= self.limit_bytes && !self.is_cooling_down(now)
    }

    pub fn mark_triggered(&mut self, now: Instant) {
        self.last_triggered = Some(now);
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} >= {} ({})",
            self.action,
            format_bytes(self.limit_bytes),
            self.description
        )
    }
}

/// Thresholds sorted ascending by limit in bytes
pub struct ThresholdTable {
    thresholds: Vec<Threshold>,
    clock: SharedClock,
}

impl ThresholdTable {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            thresholds: Vec::new(),
            clock,
        }
    }

    /// Insert keeping ascending order; equal limits keep insertion order
    pub fn insert(&mut self, threshold: Threshold) {
        let at = self
            .thresholds
            .partition_point(|t| t.limit_bytes <= threshold.limit_bytes);
        debug!(threshold = %threshold, position = at, "Threshold added");
        self.thresholds.insert(at, threshold);
    }

    /// Mark and return every threshold exceeded by `usage`, smallest limit first
    pub fn evaluate(&mut self, usage: Bytes) -> Vec<Threshold> {
        let now = self.clock.now();
        self.thresholds
            .iter_mut()
            .filter(|t| t.is_exceeded(usage, now))
            .map(|t| {
                t.mark_triggered(now);
                t.clone()
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
