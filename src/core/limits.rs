/*!
 * Limits and Defaults
 *
 * Centralized location for intervals, caps, and tuning constants used by the
 * monitor, limiter, optimizer, profiler, and progress estimator.
 * Organized by subsystem.
 */

use crate::core::types::{Bytes, MIB};
use std::time::Duration;

// =============================================================================
// MONITORING
// =============================================================================

/// Default interval between usage samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum accepted poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Retained history window (one hour of samples at the configured rate)
pub const HISTORY_WINDOW: Duration = Duration::from_secs(3600);

/// Upper bound on how long stop() waits for a polling thread to exit
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum time between requested (non-forced) collections
pub const DEFAULT_GC_MIN_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// THROTTLING
// =============================================================================

/// Lower bound of the throttle factor
pub const MIN_THROTTLE_FACTOR: f64 = 0.1;

/// No throttling
pub const MAX_THROTTLE_FACTOR: f64 = 1.0;

/// Loosest factor a throttle threshold may apply
pub const MAX_APPLIED_THROTTLE_FACTOR: f64 = 0.9;

/// Relaxation applied per quiet polling cycle
pub const THROTTLE_RELAX_STEP: f64 = 0.05;

/// Default threshold cooldown
pub const DEFAULT_THRESHOLD_COOLDOWN: Duration = Duration::from_secs(60);

/// Default thresholds as percent of system memory
pub const DEFAULT_WARN_PERCENT: f64 = 60.0;
pub const DEFAULT_GC_PERCENT: f64 = 75.0;
pub const DEFAULT_THROTTLE_PERCENT: f64 = 85.0;
pub const DEFAULT_ABORT_PERCENT: f64 = 95.0;

// =============================================================================
// OPTIMIZER
// =============================================================================

/// Hard cap applied by optimize_collections
pub const DEFAULT_MAX_COLLECTION_SIZE: usize = 10_000;

/// Pooled instances retained per optimized type
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Memoized entries retained per cached method
pub const DEFAULT_CACHE_SIZE: usize = 1_000;

// =============================================================================
// PROFILER
// =============================================================================

/// Allocation sites reported per profile
pub const DEFAULT_TOP_SITES: usize = 10;

/// Profile results retained by a profiler
pub const DEFAULT_MAX_PROFILE_RESULTS: usize = 256;

/// Allocation sites the counting allocator can attribute (site 0 is unattributed)
pub const MAX_ALLOCATION_SITES: usize = 64;

// =============================================================================
// PROGRESS ESTIMATION
// =============================================================================

/// Rolling (elapsed, step) samples kept for rate estimation
pub const RATE_HISTORY_CAPACITY: usize = 100;

/// Most recent samples used for the slope average
pub const RATE_WINDOW: usize = 10;

/// Weight of a fresh estimate against the previous one
pub const ESTIMATE_SMOOTHING: f64 = 0.2;

/// Tolerance when checking that stage weights sum to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Default memory figure used when the system total cannot be read
pub const FALLBACK_SYSTEM_MEMORY: Bytes = 8 * 1024 * MIB;
