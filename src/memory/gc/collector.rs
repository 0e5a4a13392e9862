/*!
 * Garbage Collector
 * Process-wide cleanup through registered reclaimers
 *
 * Rust has no tracing collector, so "collection" means asking every
 * registered cache or pool to drop what it can. The monitor measures RSS
 * around the cycle to report what was actually returned to the OS.
 */

use crate::core::limits::DEFAULT_GC_MIN_INTERVAL;
use crate::core::serde::{is_zero_u64, is_zero_usize};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reclaimer callback: drops cached state and returns the number of items freed
pub type ReclaimFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Collection statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GcStats {
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub reclaimed_items: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub reclaimers_run: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub reclaimers_failed: usize,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub duration_us: u64,
}

impl GcStats {
    /// Average items per reclaimer
    pub fn items_per_reclaimer(&self) -> f64 {
        if self.reclaimers_run == 0 {
            0.0
        } else {
            self.reclaimed_items as f64 / self.reclaimers_run as f64
        }
    }
}

struct Reclaimer {
    id: u64,
    name: String,
    reclaim: ReclaimFn,
}

/// Registry of reclaimers run on each collection
pub struct GarbageCollector {
    reclaimers: RwLock<Vec<Reclaimer>>,
    next_id: Mutex<u64>,
    last_gc: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self::with_min_interval(DEFAULT_GC_MIN_INTERVAL)
    }

    /// Create a collector with a custom minimum spacing for [`auto_collect`](Self::auto_collect)
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            reclaimers: RwLock::new(Vec::new()),
            next_id: Mutex::new(1),
            last_gc: Mutex::new(None),
            min_interval,
        }
    }

    /// Register a reclaimer; returns an id usable with [`unregister`](Self::unregister)
    pub fn register<F>(&self, name: impl Into<String>, reclaim: F) -> u64
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let name = name.into();
        debug!(reclaimer = %name, id, "Registered reclaimer");
        self.reclaimers.write().push(Reclaimer {
            id,
            name,
            reclaim: Arc::new(reclaim),
        });
        id
    }

    pub fn unregister(&self, id: u64) -> bool {
        let mut reclaimers = self.reclaimers.write();
        let before = reclaimers.len();
        reclaimers.retain(|r| r.id != id);
        reclaimers.len() != before
    }

    pub fn reclaimer_count(&self) -> usize {
        self.reclaimers.read().len()
    }

    /// Run every reclaimer once
    pub fn collect(&self) -> GcStats {
        let start = Instant::now();

        // Snapshot callbacks so reclaimers may register/unregister re-entrantly
        let callbacks: Vec<(String, ReclaimFn)> = self
            .reclaimers
            .read()
            .iter()
            .map(|r| (r.name.clone(), Arc::clone(&r.reclaim)))
            .collect();

        let mut stats = GcStats::default();
        for (name, reclaim) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| reclaim())) {
                Ok(freed) => {
                    stats.reclaimed_items += freed;
                    stats.reclaimers_run += 1;
                }
                Err(_) => {
                    stats.reclaimers_failed += 1;
                    warn!(reclaimer = %name, "Reclaimer panicked during collection");
                }
            }
        }

        *self.last_gc.lock() = Some(Instant::now());
        stats.duration_us = start.elapsed().as_micros() as u64;

        info!(
            reclaimed_items = stats.reclaimed_items,
            reclaimers = stats.reclaimers_run,
            duration_us = stats.duration_us,
            "Garbage collection completed"
        );

        stats
    }

    /// Check if enough time passed since the last collection
    pub fn should_collect(&self) -> bool {
        match *self.last_gc.lock() {
            Some(last) => last.elapsed() >= self.min_interval,
            None => true,
        }
    }

    /// Collect only if the minimum interval has elapsed
    pub fn auto_collect(&self) -> Option<GcStats> {
        if self.should_collect() {
            Some(self.collect())
        } else {
            None
        }
    }

    pub fn time_since_last_gc(&self) -> Option<Duration> {
        self.last_gc.lock().map(|last| last.elapsed())
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("reclaimers", &self.reclaimer_count())
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
