/*!
 * SEO Analyzer Core Library
 * Progress tracking and memory management for the analysis pipeline
 */

pub mod core;
pub mod memory;
pub mod monitoring;
pub mod progress;

// Re-exports
pub use crate::core::{Clock, CoreError, CoreResult, ManualClock, SharedClock, SystemClock};
pub use memory::{
    GcReport, LimiterConfig, MemoryOptimizer, MonitorConfig, OptimizationConfig,
    OptimizationLevel, OptimizationStrategy, Profiler, ProfilerConfig, ResourceError,
    ResourceLimiter, ResourceMonitor, ResourceUsageSnapshot, ThresholdAction, UsageSummary,
};
pub use monitoring::{init_tracing, span_stage};
pub use progress::{
    create_tracker, AnalyzerProgressTracker, JsonRenderer, ProgressError, ProgressStage,
    ProgressState, ProgressTracker, TextRenderer, Tracker, TrackerRegistry,
};
