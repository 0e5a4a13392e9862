/*!
 * Memory Module
 * Resource monitoring, threshold enforcement, optimization, and profiling
 *
 * - [`ResourceMonitor`]: samples process usage and keeps bounded history
 * - [`ResourceLimiter`]: evaluates thresholds and maintains the throttle factor
 * - [`MemoryOptimizer`]: pooling, caching, and collection capping
 * - [`Profiler`]: scoped time/memory/allocation measurement
 */

pub mod alloc;
pub mod config;
pub mod gc;
pub mod limiter;
pub mod monitor;
pub mod optimizer;
pub mod poller;
pub mod probe;
pub mod profiler;
pub mod threshold;
pub mod types;

// Re-export for convenience
pub use alloc::{
    allocation_snapshot, enter_site, AllocationSnapshot, CountingAllocator, SiteDelta, SiteGuard,
};
pub use config::{LimiterConfig, MonitorConfig};
pub use gc::{GarbageCollector, GcStats};
pub use limiter::{CycleOutcome, LimitCallback, ResourceLimiter};
pub use monitor::ResourceMonitor;
pub use optimizer::{
    MemoryOptimizer, OperationGuard, OperationSummary, OptimizationConfig, OptimizationLevel,
    OptimizationStrategy, OptimizedClass,
};
pub use probe::{ScriptedProbe, SystemProbe, UsageProbe};
pub use profiler::{ProfileResult, ProfileScope, Profiler, ProfilerConfig};
pub use threshold::{Threshold, ThresholdTable};
pub use types::*;
