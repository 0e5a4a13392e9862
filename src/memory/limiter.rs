/*!
 * Resource Limiter
 * Enforces tiered thresholds and maintains a global throttle factor
 *
 * A background loop samples the monitor, fires exceeded thresholds and
 * relaxes throttling when quiet. Callers read the throttle factor or pay it
 * cooperatively through [`ResourceLimiter::throttle_if_needed`].
 */

use super::config::LimiterConfig;
use super::monitor::ResourceMonitor;
use super::poller::Poller;
use super::threshold::{Threshold, ThresholdTable};
use super::types::{MemoryUnit, ResourceError, ResourceResult, ThresholdAction};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::limits::{
    DEFAULT_ABORT_PERCENT, DEFAULT_GC_PERCENT, DEFAULT_THRESHOLD_COOLDOWN,
    DEFAULT_THROTTLE_PERCENT, DEFAULT_WARN_PERCENT, MAX_THROTTLE_FACTOR,
};
use crate::core::types::{format_bytes, Bytes};
use ahash::HashMap;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback invoked with the current usage and the threshold that fired
pub type LimitCallback = Arc<dyn Fn(Bytes, &Threshold) + Send + Sync>;

/// Result of one evaluation cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub usage: Bytes,
    /// Thresholds fired this cycle, ascending by limit
    pub fired: Vec<Threshold>,
    /// `error`/`abort` failures raised and caught during the cycle
    pub failures: Vec<ResourceError>,
    /// Throttle factor after the cycle
    pub throttle_factor: f64,
}

impl CycleOutcome {
    pub fn fired_actions(&self) -> Vec<ThresholdAction> {
        self.fired.iter().map(|t| t.action).collect()
    }
}

struct LimiterShared {
    monitor: Arc<ResourceMonitor>,
    thresholds: Mutex<ThresholdTable>,
    throttle_factor: Mutex<f64>,
    callbacks: RwLock<HashMap<ThresholdAction, Vec<LimitCallback>>>,
    config: LimiterConfig,
}

impl LimiterShared {
    fn apply_throttling(&self, factor: f64) -> f64 {
        let mut current = self.throttle_factor.lock();
        if factor.is_nan() {
            warn!("Ignoring NaN throttle factor");
            return *current;
        }
        *current = factor.clamp(self.config.min_factor, MAX_THROTTLE_FACTOR);
        *current
    }

    fn relax(&self) -> f64 {
        let mut current = self.throttle_factor.lock();
        if *current < MAX_THROTTLE_FACTOR {
            *current = (*current + self.config.relax_step).min(MAX_THROTTLE_FACTOR);
            debug!(throttle_factor = *current, "Throttle relaxed");
        }
        *current
    }

    fn invoke_callbacks(&self, usage: Bytes, threshold: &Threshold) {
        // Clone out so callbacks may register further callbacks
        let callbacks: Vec<LimitCallback> = self
            .callbacks
            .read()
            .get(&threshold.action)
            .cloned()
            .unwrap_or_default();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(usage, threshold))).is_err() {
                error!(
                    action = %threshold.action,
                    threshold = %threshold.description,
                    "Limit callback panicked"
                );
            }
        }
    }

    fn limit_exceeded(usage: Bytes, threshold: &Threshold) -> ResourceError {
        ResourceError::LimitExceeded {
            usage,
            limit: threshold.limit_in_bytes(),
            action: threshold.action,
            description: threshold.description.clone(),
        }
    }

    /// Execute the action for one exceeded threshold
    ///
    /// `cycle_factor` carries the strictest throttle applied so far this cycle.
    fn handle_exceeded(
        &self,
        usage: Bytes,
        threshold: &Threshold,
        cycle_factor: &mut Option<f64>,
    ) -> ResourceResult<()> {
        let usage_str = format_bytes(usage);
        let limit_str = format_bytes(threshold.limit_in_bytes());

        match threshold.action {
            ThresholdAction::Warn => {
                warn!(
                    usage = %usage_str,
                    limit = %limit_str,
                    threshold = %threshold.description,
                    "Memory usage above warning threshold"
                );
                self.invoke_callbacks(usage, threshold);
                Ok(())
            }
            ThresholdAction::Error => {
                error!(
                    usage = %usage_str,
                    limit = %limit_str,
                    threshold = %threshold.description,
                    "Memory usage above error threshold"
                );
                self.invoke_callbacks(usage, threshold);
                Err(Self::limit_exceeded(usage, threshold))
            }
            ThresholdAction::Gc => {
                info!(
                    usage = %usage_str,
                    limit = %limit_str,
                    "Memory threshold triggered garbage collection"
                );
                self.monitor.force_garbage_collection();
                self.invoke_callbacks(usage, threshold);
                Ok(())
            }
            ThresholdAction::Throttle => {
                let computed = (threshold.limit_in_bytes() as f64 / usage.max(1) as f64)
                    .clamp(self.config.min_factor, self.config.max_applied_factor);
                let factor = match *cycle_factor {
                    Some(stricter) if stricter < computed => stricter,
                    _ => computed,
                };
                *cycle_factor = Some(factor);
                let applied = self.apply_throttling(factor);
                warn!(
                    usage = %usage_str,
                    limit = %limit_str,
                    throttle_factor = applied,
                    "Memory pressure; throttling work"
                );
                self.invoke_callbacks(usage, threshold);
                Ok(())
            }
            ThresholdAction::Abort => {
                error!(
                    usage = %usage_str,
                    limit = %limit_str,
                    threshold = %threshold.description,
                    "CRITICAL: memory usage above abort threshold"
                );
                self.invoke_callbacks(usage, threshold);
                Err(Self::limit_exceeded(usage, threshold))
            }
        }
    }

    /// Loop-side cycle: failures are caught and collected
    fn run_cycle(&self, usage: Bytes) -> CycleOutcome {
        let fired = self.thresholds.lock().evaluate(usage);
        let mut failures = Vec::new();
        let mut cycle_factor = None;

        for threshold in &fired {
            if let Err(e) = self.handle_exceeded(usage, threshold, &mut cycle_factor) {
                debug!(error = %e, "Limit failure caught by poll loop");
                failures.push(e);
            }
        }

        let throttle_factor = if fired.is_empty() {
            self.relax()
        } else {
            *self.throttle_factor.lock()
        };

        CycleOutcome {
            usage,
            fired,
            failures,
            throttle_factor,
        }
    }

    fn poll_once(&self) -> ResourceResult<CycleOutcome> {
        let snapshot = self.monitor.sample()?;
        Ok(self.run_cycle(snapshot.rss))
    }
}

/// Threshold enforcement over a [`ResourceMonitor`]
pub struct ResourceLimiter {
    shared: Arc<LimiterShared>,
    poller: Mutex<Option<Poller>>,
}

impl ResourceLimiter {
    pub fn new(monitor: Arc<ResourceMonitor>, config: LimiterConfig) -> Self {
        Self::with_clock(monitor, config, system_clock())
    }

    /// Create a limiter whose cooldowns follow `clock`
    pub fn with_clock(
        monitor: Arc<ResourceMonitor>,
        config: LimiterConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                monitor,
                thresholds: Mutex::new(ThresholdTable::new(clock)),
                throttle_factor: Mutex::new(MAX_THROTTLE_FACTOR),
                callbacks: RwLock::new(HashMap::default()),
                config,
            }),
            poller: Mutex::new(None),
        }
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.shared.monitor
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.shared.config
    }

    /// Add a threshold; the table stays sorted by limit
    pub fn add_threshold(
        &self,
        limit: f64,
        action: ThresholdAction,
        unit: MemoryUnit,
        cooldown: Duration,
        description: impl Into<String>,
    ) -> ResourceResult<()> {
        let threshold = Threshold::new(
            limit,
            unit,
            action,
            cooldown,
            description,
            self.shared.monitor.system_memory(),
        )?;
        self.shared.thresholds.lock().insert(threshold);
        Ok(())
    }

    /// Install warn/gc/throttle/abort thresholds at 60/75/85/95% of system memory
    pub fn add_default_thresholds(&self) -> ResourceResult<()> {
        let defaults = [
            (DEFAULT_WARN_PERCENT, ThresholdAction::Warn, "high memory usage"),
            (DEFAULT_GC_PERCENT, ThresholdAction::Gc, "collect caches"),
            (DEFAULT_THROTTLE_PERCENT, ThresholdAction::Throttle, "slow down work"),
            (DEFAULT_ABORT_PERCENT, ThresholdAction::Abort, "memory exhausted"),
        ];
        for (percent, action, description) in defaults {
            self.add_threshold(
                percent,
                action,
                MemoryUnit::Percent,
                DEFAULT_THRESHOLD_COOLDOWN,
                description,
            )?;
        }
        Ok(())
    }

    /// Snapshot of the configured thresholds, ascending
    pub fn thresholds(&self) -> Vec<Threshold> {
        self.shared.thresholds.lock().iter().cloned().collect()
    }

    pub fn register_callback<F>(&self, action: ThresholdAction, callback: F)
    where
        F: Fn(Bytes, &Threshold) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .write()
            .entry(action)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn throttle_factor(&self) -> f64 {
        *self.shared.throttle_factor.lock()
    }

    pub fn should_throttle(&self) -> bool {
        self.throttle_factor() < MAX_THROTTLE_FACTOR
    }

    /// Set the throttle factor, clamped to [min_factor, 1.0]; returns the applied value
    pub fn apply_throttling(&self, factor: f64) -> f64 {
        self.shared.apply_throttling(factor)
    }

    /// Delay a caller pays at the current factor
    pub fn throttle_delay(&self) -> Duration {
        let factor = self.throttle_factor();
        if factor >= MAX_THROTTLE_FACTOR {
            return Duration::ZERO;
        }
        self.shared
            .config
            .poll_interval
            .mul_f64(MAX_THROTTLE_FACTOR - factor)
    }

    /// Suspend for `(1.0 - factor) * poll_interval` when throttled
    ///
    /// Returns immediately when not throttled. Returns the delay paid.
    pub async fn throttle_if_needed(&self) -> Duration {
        let delay = self.throttle_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Throttling caller");
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Evaluate `usage` synchronously; `error`/`abort` failures propagate
    ///
    /// Every fired threshold is handled before returning, since firing
    /// starts its cooldown. The first failure in ascending order is
    /// returned; otherwise the actions handled.
    pub fn check_usage(&self, usage: Bytes) -> ResourceResult<Vec<ThresholdAction>> {
        let fired = self.shared.thresholds.lock().evaluate(usage);
        let mut cycle_factor = None;
        let mut handled = Vec::with_capacity(fired.len());
        let mut first_failure = None;

        for threshold in &fired {
            match self
                .shared
                .handle_exceeded(usage, threshold, &mut cycle_factor)
            {
                Ok(()) => handled.push(threshold.action),
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Run one loop cycle against a given usage without sampling
    pub fn evaluate_cycle(&self, usage: Bytes) -> CycleOutcome {
        self.shared.run_cycle(usage)
    }

    /// Sample the monitor and run one loop cycle
    pub fn poll_once(&self) -> ResourceResult<CycleOutcome> {
        self.shared.poll_once()
    }

    /// Start the background loop; returns false if already running
    pub fn start(&self) -> ResourceResult<bool> {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        *poller = Some(Poller::spawn(
            "resource-limiter",
            self.shared.config.poll_interval,
            move || match shared.poll_once() {
                Ok(outcome) => {
                    for failure in &outcome.failures {
                        warn!(error = %failure, "Limit exceeded during background check");
                    }
                }
                Err(e) => warn!(error = %e, "Limiter poll failed"),
            },
        )?);

        info!(
            thresholds = self.shared.thresholds.lock().len(),
            poll_ms = self.shared.config.poll_interval.as_millis() as u64,
            "Resource limiter started"
        );
        Ok(true)
    }

    /// Stop the background loop; returns false if it was not running
    pub fn stop(&self) -> bool {
        let Some(poller) = self.poller.lock().take() else {
            return false;
        };
        poller.stop(self.shared.config.join_timeout);
        info!("Resource limiter stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.poller.lock().is_some()
    }
}

impl Drop for ResourceLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}
