/*!
 * Rate Estimator
 * Time-remaining estimation from a rolling history of progress samples
 *
 * Samples are `(elapsed_secs, step)` pairs recorded on every progress update.
 * The rate is the mean slope across the most recent window; when every pair
 * in the window is degenerate (no time or no step change) the slope between
 * the first and last retained samples is used instead. Fresh estimates are
 * exponentially smoothed against the previous one.
 */

use crate::core::limits::{ESTIMATE_SMOOTHING, RATE_HISTORY_CAPACITY, RATE_WINDOW};
use crate::core::types::Step;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::types::{ProgressError, ProgressResult};

/// Estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Samples retained
    pub history_capacity: usize,
    /// Most recent samples used for the slope average
    pub window: usize,
    /// Weight of a fresh estimate against the previous one
    pub smoothing: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            history_capacity: RATE_HISTORY_CAPACITY,
            window: RATE_WINDOW,
            smoothing: ESTIMATE_SMOOTHING,
        }
    }
}

impl EstimatorConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(2);
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(2);
        self
    }

    /// Set smoothing weight; must lie in (0, 1]
    pub fn with_smoothing(mut self, smoothing: f64) -> ProgressResult<Self> {
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            return Err(ProgressError::InvalidWeights(format!(
                "smoothing {} must be in (0, 1]",
                smoothing
            )));
        }
        self.smoothing = smoothing;
        Ok(self)
    }
}

/// Rolling rate estimator
#[derive(Debug, Clone)]
pub struct RateEstimator {
    config: EstimatorConfig,
    samples: VecDeque<(f64, f64)>,
    /// Smoothed remaining seconds from the last recorded sample
    smoothed: Option<f64>,
}

impl RateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.history_capacity.min(RATE_HISTORY_CAPACITY)),
            config,
            smoothed: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.smoothed = None;
    }

    /// Record a sample and refresh the smoothed estimate for `total` steps
    pub fn record(&mut self, elapsed: Duration, step: Step, total: Step) {
        if self.samples.len() >= self.config.history_capacity.max(2) {
            self.samples.pop_front();
        }
        self.samples.push_back((elapsed.as_secs_f64(), step as f64));

        let remaining_steps = total.saturating_sub(step);
        let Some(fresh) = self.fresh_estimate(remaining_steps) else {
            return;
        };
        let alpha = self.config.smoothing;
        self.smoothed = Some(match self.smoothed {
            Some(previous) => alpha * fresh + (1.0 - alpha) * previous,
            None => fresh,
        });
    }

    /// Steps per second, if enough non-degenerate history exists
    pub fn rate(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }

        let window = self.config.window.max(2).min(self.samples.len());
        let recent = self.samples.range(self.samples.len() - window..);
        let slopes: Vec<f64> = recent
            .clone()
            .zip(recent.skip(1))
            .filter_map(|((t0, s0), (t1, s1))| {
                let dt = t1 - t0;
                let ds = s1 - s0;
                (dt > 0.0 && ds != 0.0).then(|| ds / dt)
            })
            .collect();

        if !slopes.is_empty() {
            let mean = slopes.iter().sum::<f64>() / slopes.len() as f64;
            if mean > 0.0 {
                return Some(mean);
            }
        }

        self.overall_rate()
    }

    /// Slope between the first and last retained samples
    fn overall_rate(&self) -> Option<f64> {
        let (t0, s0) = *self.samples.front()?;
        let (t1, s1) = *self.samples.back()?;
        let dt = t1 - t0;
        let ds = s1 - s0;
        (dt > 0.0 && ds > 0.0).then(|| ds / dt)
    }

    fn fresh_estimate(&self, remaining_steps: Step) -> Option<f64> {
        if remaining_steps == 0 {
            return Some(0.0);
        }
        self.rate().map(|rate| remaining_steps as f64 / rate)
    }

    /// Smoothed time remaining as of the last recorded sample
    pub fn estimate(&self) -> Option<Duration> {
        self.smoothed
            .filter(|secs| secs.is_finite())
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
