/*!
 * Progress Module
 * Weighted multi-stage progress tracking with time-remaining estimation
 *
 * # Example
 *
 * ```ignore
 * let mut tracker = create_tracker("analyzer", "example.com", 100)?;
 * tracker.start()?;
 * tracker.set_stage(ProgressStage::Analysis, 0.0)?;
 * if let Some(analyzer) = tracker.as_analyzer_mut() {
 *     analyzer.set_analyzer_progress("meta_tags", 1.0, "done")?;
 * }
 * println!("{}", tracker.render(&TextRenderer::default()));
 * ```
 */

pub mod analyzer;
pub mod estimator;
pub mod registry;
pub mod render;
pub mod tracker;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use analyzer::{AnalyzerProgressTracker, AnalyzerUnit, DEFAULT_ANALYZER_WEIGHT};
pub use estimator::{EstimatorConfig, RateEstimator};
pub use registry::{create_tracker, TrackerFactory, TrackerOptions, TrackerRegistry};
pub use render::{
    format_duration, JsonRenderer, ProgressRenderer, ProgressSnapshot, StageSnapshot,
    TextRenderer, UnitSnapshot,
};
pub use tracker::ProgressTracker;
pub use traits::Tracker;
pub use types::*;
