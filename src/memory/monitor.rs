/*!
 * Resource Monitor
 * Samples process usage, keeps a bounded history, tracks peak RSS
 */

use super::config::MonitorConfig;
use super::gc::GarbageCollector;
use super::poller::Poller;
use super::probe::{SystemProbe, UsageProbe};
use super::types::{GcReport, ResourceResult, ResourceUsageSnapshot, UsageSummary};
use crate::core::types::{format_bytes, Bytes};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

struct MonitorShared {
    probe: Arc<dyn UsageProbe>,
    config: MonitorConfig,
    capacity: usize,
    history: Mutex<VecDeque<ResourceUsageSnapshot>>,
    peak_rss: AtomicU64,
    gc: Arc<GarbageCollector>,
}

impl MonitorShared {
    fn current(&self) -> ResourceResult<ResourceUsageSnapshot> {
        let snapshot = self.probe.sample()?;
        self.peak_rss.fetch_max(snapshot.rss, Ordering::Relaxed);
        Ok(snapshot)
    }

    fn record(&self) -> ResourceResult<ResourceUsageSnapshot> {
        let snapshot = self.current()?;
        let mut history = self.history.lock();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(snapshot.clone());
        Ok(snapshot)
    }
}

/// Process resource monitor
///
/// One background poll loop at most; [`start_monitoring`](Self::start_monitoring)
/// and [`stop_monitoring`](Self::stop_monitoring) are idempotent.
pub struct ResourceMonitor {
    shared: Arc<MonitorShared>,
    poller: Mutex<Option<Poller>>,
}

impl ResourceMonitor {
    /// Monitor the current process
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_probe(Arc::new(SystemProbe::new()), config)
    }

    /// Monitor through a custom probe
    pub fn with_probe(probe: Arc<dyn UsageProbe>, config: MonitorConfig) -> Self {
        let gc = Arc::new(GarbageCollector::with_min_interval(config.gc_min_interval));
        Self::with_collector(probe, config, gc)
    }

    /// Monitor sharing an existing collector (e.g. with an optimizer)
    pub fn with_collector(
        probe: Arc<dyn UsageProbe>,
        config: MonitorConfig,
        gc: Arc<GarbageCollector>,
    ) -> Self {
        let capacity = config.history_capacity();
        debug!(
            poll_ms = config.poll_interval.as_millis() as u64,
            capacity, "Resource monitor created"
        );

        Self {
            shared: Arc::new(MonitorShared {
                probe,
                config,
                capacity,
                history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                peak_rss: AtomicU64::new(0),
                gc,
            }),
            poller: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Garbage collector run by this monitor
    pub fn collector(&self) -> &Arc<GarbageCollector> {
        &self.shared.gc
    }

    /// Total physical memory as reported by the probe
    pub fn system_memory(&self) -> Bytes {
        self.shared.probe.system_memory()
    }

    /// Take a reading without recording it; updates the peak
    pub fn get_current_usage(&self) -> ResourceResult<ResourceUsageSnapshot> {
        self.shared.current()
    }

    /// Take a reading and append it to history
    pub fn sample(&self) -> ResourceResult<ResourceUsageSnapshot> {
        self.shared.record()
    }

    /// Highest RSS seen by any reading
    pub fn peak_rss(&self) -> Bytes {
        self.shared.peak_rss.load(Ordering::Relaxed)
    }

    pub fn history(&self) -> Vec<ResourceUsageSnapshot> {
        self.shared.history.lock().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.shared.history.lock().len()
    }

    pub fn history_capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Summarize retained history plus a current reading
    ///
    /// Falls back to history alone when the probe fails.
    pub fn get_usage_summary(&self) -> UsageSummary {
        let current = match self.shared.current() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Current usage unavailable for summary");
                None
            }
        };
        let history = self.shared.history.lock();
        summarize(history.iter(), current.as_ref())
    }

    /// Run a collection cycle unconditionally
    pub fn force_garbage_collection(&self) -> GcReport {
        let start = Instant::now();
        let before = self.shared.current().ok();
        let stats = self.shared.gc.collect();
        let after = self.shared.current().ok();

        let freed_bytes = match (&before, &after) {
            (Some(b), Some(a)) => b.rss.saturating_sub(a.rss),
            _ => 0,
        };

        info!(
            freed = %format_bytes(freed_bytes),
            reclaimed_items = stats.reclaimed_items,
            "Forced garbage collection"
        );

        GcReport {
            before,
            after,
            freed_bytes,
            reclaimed_items: stats.reclaimed_items,
            reclaimers_run: stats.reclaimers_run,
            duration: start.elapsed(),
        }
    }

    /// Run a collection cycle unless one ran within the minimum interval
    pub fn request_garbage_collection(&self) -> Option<GcReport> {
        if self.shared.gc.should_collect() {
            Some(self.force_garbage_collection())
        } else {
            debug!("Garbage collection request skipped; ran recently");
            None
        }
    }

    /// Start the background poll loop; returns false if already running
    pub fn start_monitoring(&self) -> ResourceResult<bool> {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        *poller = Some(Poller::spawn(
            "resource-monitor",
            self.shared.config.poll_interval,
            move || {
                if let Err(e) = shared.record() {
                    warn!(error = %e, "Monitor poll failed");
                }
            },
        )?);

        info!(
            poll_ms = self.shared.config.poll_interval.as_millis() as u64,
            "Resource monitoring started"
        );
        Ok(true)
    }

    /// Stop the background loop; returns false if it was not running
    pub fn stop_monitoring(&self) -> bool {
        let Some(poller) = self.poller.lock().take() else {
            return false;
        };
        poller.stop(self.shared.config.join_timeout);
        info!("Resource monitoring stopped");
        true
    }

    pub fn is_monitoring(&self) -> bool {
        self.poller.lock().is_some()
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("config", &self.shared.config)
            .field("history_len", &self.history_len())
            .field("peak_rss", &self.peak_rss())
            .finish()
    }
}

/// Aggregate snapshots; `current` counts toward peak and average but not `samples`
pub fn summarize<'a, I>(history: I, current: Option<&'a ResourceUsageSnapshot>) -> UsageSummary
where
    I: IntoIterator<Item = &'a ResourceUsageSnapshot>,
{
    let mut samples = 0usize;
    let mut rss_total = 0u128;
    let mut vms_total = 0u128;
    let mut peak_rss = 0;
    let mut peak_vms = 0;
    let mut last = None;

    let mut fold = |snapshot: &'a ResourceUsageSnapshot| {
        rss_total += snapshot.rss as u128;
        vms_total += snapshot.vms as u128;
        peak_rss = peak_rss.max(snapshot.rss);
        peak_vms = peak_vms.max(snapshot.vms);
        last = Some(snapshot);
    };

    for snapshot in history {
        samples += 1;
        fold(snapshot);
    }
    if let Some(snapshot) = current {
        fold(snapshot);
    }

    let count = (samples + usize::from(current.is_some())) as u128;
    let average = |total: u128| {
        if count == 0 {
            0
        } else {
            (total / count) as Bytes
        }
    };
    let (current_rss, current_vms) = last.map(|s| (s.rss, s.vms)).unwrap_or((0, 0));

    UsageSummary {
        current_rss,
        peak_rss,
        average_rss: average(rss_total),
        current_vms,
        peak_vms,
        average_vms: average(vms_total),
        samples,
    }
}
