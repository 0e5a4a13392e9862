/*!
 * Operation Profiler
 * Scoped memory, time, and allocation measurement
 *
 * A [`ProfileScope`] captures a baseline on entry and produces an immutable
 * [`ProfileResult`] when it finishes or drops. Drop during unwinding still
 * produces a result and marks it as panicked, then the panic continues.
 *
 * Allocation-site deltas are only collected when a
 * [`CountingAllocator`](super::alloc::CountingAllocator) is installed.
 */

use super::alloc::{allocation_snapshot, is_tracking, AllocationSnapshot, SiteDelta};
use super::config::env_or;
use super::monitor::ResourceMonitor;
use super::types::ResourceUsageSnapshot;
use crate::core::guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
use crate::core::limits::{DEFAULT_MAX_PROFILE_RESULTS, DEFAULT_TOP_SITES};
use crate::core::serde::{duration_secs, system_time_micros};
use crate::core::types::{format_byte_delta, Metadata};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, Instrument, Span};
use uuid::Uuid;

/// Profiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Diff allocation sites when the counting allocator is installed
    pub track_allocations: bool,
    /// Sites kept per result, by absolute byte delta
    pub top_sites: usize,
    /// Include CPU readings in results
    pub track_cpu: bool,
    /// Results retained before the oldest is dropped
    pub max_results: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            track_allocations: true,
            top_sites: DEFAULT_TOP_SITES,
            track_cpu: true,
            max_results: DEFAULT_MAX_PROFILE_RESULTS,
        }
    }
}

impl ProfilerConfig {
    /// Load overrides from `SEO_PROFILE_ALLOCATIONS` and `SEO_PROFILE_TOP_SITES`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            track_allocations: env_or("SEO_PROFILE_ALLOCATIONS", defaults.track_allocations),
            top_sites: env_or("SEO_PROFILE_TOP_SITES", defaults.top_sites),
            ..defaults
        }
    }

    pub fn with_allocation_tracking(mut self, enabled: bool) -> Self {
        self.track_allocations = enabled;
        self
    }

    pub fn with_top_sites(mut self, top: usize) -> Self {
        self.top_sites = top;
        self
    }

    pub fn with_cpu_tracking(mut self, enabled: bool) -> Self {
        self.track_cpu = enabled;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }
}

/// CPU readings across a profiled scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSummary {
    pub before_percent: f32,
    pub after_percent: f32,
    pub average_percent: f32,
    pub threads: usize,
}

impl CpuSummary {
    fn between(before: &ResourceUsageSnapshot, after: &ResourceUsageSnapshot) -> Self {
        Self {
            before_percent: before.cpu_percent,
            after_percent: after.cpu_percent,
            average_percent: (before.cpu_percent + after.cpu_percent) / 2.0,
            threads: after.num_threads,
        }
    }
}

/// Immutable measurement of one profiled scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResult {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "system_time_micros")]
    pub started_at: SystemTime,
    #[serde(with = "system_time_micros")]
    pub ended_at: SystemTime,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub before: Option<ResourceUsageSnapshot>,
    pub after: Option<ResourceUsageSnapshot>,
    /// Highest-RSS reading observed during the scope
    pub peak: Option<ResourceUsageSnapshot>,
    pub allocation_deltas: Option<Vec<SiteDelta>>,
    pub cpu: Option<CpuSummary>,
    /// Free-form context (captured error, panic marker, caller notes)
    pub context: Metadata,
}

impl ProfileResult {
    /// Signed RSS change across the scope (zero when a reading failed)
    pub fn rss_delta(&self) -> i64 {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => after.rss_delta_since(before),
            _ => 0,
        }
    }

    pub fn panicked(&self) -> bool {
        self.context
            .get("panicked")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn error(&self) -> Option<&str> {
        self.context.get("error").and_then(Value::as_str)
    }
}

impl fmt::Display for ProfileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.3}s rss {}",
            self.name,
            self.duration.as_secs_f64(),
            format_byte_delta(self.rss_delta())
        )?;
        if let Some(error) = self.error() {
            write!(f, " (error: {})", error)?;
        }
        Ok(())
    }
}

/// Collects profile results for a monitor
pub struct Profiler {
    monitor: Arc<ResourceMonitor>,
    config: ProfilerConfig,
    results: Mutex<VecDeque<ProfileResult>>,
}

impl Profiler {
    pub fn new(monitor: Arc<ResourceMonitor>, config: ProfilerConfig) -> Self {
        Self {
            monitor,
            config,
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Open a profiled scope
    pub fn profile_block(&self, name: &str) -> ProfileScope<'_> {
        ProfileScope::begin(self, name)
    }

    /// Profile a closure; the return value is passed through
    pub fn profile_fn<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let scope = self.profile_block(name);
        let value = f();
        scope.finish();
        value
    }

    /// Profile a fallible closure, recording any error in the result context
    ///
    /// The error is returned unchanged.
    pub fn profile_result<T, E: fmt::Display>(
        &self,
        name: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut scope = self.profile_block(name);
        let outcome = f();
        if let Err(e) = &outcome {
            scope.record_error(e);
        }
        scope.finish();
        outcome
    }

    /// Profile a future across all of its polls
    pub async fn profile_async<F: Future>(&self, name: &str, future: F) -> F::Output {
        let scope = self.profile_block(name);
        let span = scope.span.clone();
        let value = future.instrument(span).await;
        scope.finish();
        value
    }

    /// Profile a closure and return its value together with the result
    pub fn measure<R>(&self, name: &str, f: impl FnOnce() -> R) -> (R, ProfileResult) {
        let scope = self.profile_block(name);
        let value = f();
        (value, scope.finish())
    }

    /// Retained results, oldest first
    pub fn results(&self) -> Vec<ProfileResult> {
        self.results.lock().iter().cloned().collect()
    }

    pub fn last_result(&self) -> Option<ProfileResult> {
        self.results.lock().back().cloned()
    }

    pub fn clear_results(&self) {
        self.results.lock().clear();
    }

    fn store(&self, result: ProfileResult) {
        let mut results = self.results.lock();
        while results.len() >= self.config.max_results.max(1) {
            results.pop_front();
        }
        results.push_back(result);
    }

    fn allocations_enabled(&self) -> bool {
        self.config.track_allocations && is_tracking()
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("config", &self.config)
            .field("results", &self.results.lock().len())
            .finish()
    }
}

/// RAII guard returned by [`Profiler::profile_block`]
pub struct ProfileScope<'a> {
    profiler: &'a Profiler,
    metadata: GuardMetadata,
    span: Span,
    id: Uuid,
    started_at: SystemTime,
    started: Instant,
    before: Option<ResourceUsageSnapshot>,
    allocations_before: Option<AllocationSnapshot>,
    context: Metadata,
    result: Option<ProfileResult>,
}

impl<'a> ProfileScope<'a> {
    fn begin(profiler: &'a Profiler, name: &str) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("profile_block", operation = name, profile_id = %id);
        let allocations_before = profiler.allocations_enabled().then(allocation_snapshot);
        let before = profiler.monitor.get_current_usage().ok();

        debug!(operation = name, profile_id = %id, "Profile scope opened");

        Self {
            profiler,
            metadata: GuardMetadata::new("profile", name),
            span,
            id,
            started_at: SystemTime::now(),
            started: Instant::now(),
            before,
            allocations_before,
            context: Metadata::new(),
            result: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Attach a context entry to the eventual result
    pub fn record_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    /// Record an error raised inside the scope
    pub fn record_error(&mut self, error: &dyn fmt::Display) {
        self.record_context("error", error.to_string());
    }

    fn peak_during(
        &self,
        after: Option<&ResourceUsageSnapshot>,
    ) -> Option<ResourceUsageSnapshot> {
        let sampled = self.profiler.monitor.history();
        let in_scope = sampled.iter().filter(|s| s.timestamp >= self.started_at);
        self.before
            .iter()
            .chain(in_scope)
            .chain(after)
            .max_by_key(|snapshot| snapshot.rss)
            .cloned()
    }

    fn build_result(&mut self) -> ProfileResult {
        let _entered = self.span.enter();
        let duration = self.started.elapsed();
        let after = self.profiler.monitor.get_current_usage().ok();

        let allocation_deltas = self.allocations_before.as_ref().map(|before| {
            let later = allocation_snapshot();
            before.diff(&later, self.profiler.config.top_sites)
        });

        let cpu = match (&self.before, &after) {
            (Some(before), Some(after)) if self.profiler.config.track_cpu => {
                Some(CpuSummary::between(before, after))
            }
            _ => None,
        };

        if std::thread::panicking() {
            self.context.insert("panicked".into(), Value::Bool(true));
        }

        let result = ProfileResult {
            id: self.id,
            name: self.metadata.name.clone(),
            started_at: self.started_at,
            ended_at: SystemTime::now(),
            duration,
            peak: self.peak_during(after.as_ref()),
            before: self.before.clone(),
            after,
            allocation_deltas,
            cpu,
            context: std::mem::take(&mut self.context),
        };

        info!(
            operation = %result.name,
            duration_ms = duration.as_millis() as u64,
            rss_delta = %format_byte_delta(result.rss_delta()),
            panicked = result.panicked(),
            "Profile recorded"
        );
        result
    }

    fn finalize(&mut self) -> ProfileResult {
        if let Some(result) = &self.result {
            return result.clone();
        }
        let result = self.build_result();
        self.profiler.store(result.clone());
        self.result = Some(result.clone());
        result
    }

    /// Finalize now and return the result
    pub fn finish(mut self) -> ProfileResult {
        self.finalize()
    }
}

impl Guard for ProfileScope<'_> {
    fn resource_type(&self) -> &'static str {
        "profile"
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.result.is_none()
    }

    fn release(&mut self) -> GuardResult<()> {
        if self.result.is_some() {
            return Err(GuardError::AlreadyReleased);
        }
        self.finalize();
        Ok(())
    }
}

impl GuardDrop for ProfileScope<'_> {}

impl Drop for ProfileScope<'_> {
    fn drop(&mut self) {
        self.on_drop();
    }
}
