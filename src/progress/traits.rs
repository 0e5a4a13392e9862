/*!
 * Tracker Traits
 * Common interface over the tracker variants
 */

use super::analyzer::AnalyzerProgressTracker;
use super::render::{ProgressRenderer, ProgressSnapshot, UnitSnapshot};
use super::tracker::ProgressTracker;
use super::types::{ProgressMessage, ProgressResult, ProgressStage, ProgressState};
use crate::core::types::Step;
use std::time::Duration;

/// Progress tracker interface
///
/// Variants expose their stage machinery through [`base`](Tracker::base);
/// every transition and query delegates to it unless overridden.
pub trait Tracker: Send {
    /// Registry key of this variant
    fn kind(&self) -> &'static str;

    fn base(&self) -> &ProgressTracker;

    fn base_mut(&mut self) -> &mut ProgressTracker;

    /// Downcast to the per-analyzer variant
    fn as_analyzer_mut(&mut self) -> Option<&mut AnalyzerProgressTracker> {
        None
    }

    fn start(&mut self) -> ProgressResult<()> {
        self.base_mut().start()
    }

    fn pause(&mut self) -> ProgressResult<()> {
        self.base_mut().pause()
    }

    fn complete(&mut self) -> ProgressResult<()> {
        self.base_mut().complete()
    }

    fn cancel(&mut self) -> ProgressResult<()> {
        self.base_mut().cancel()
    }

    fn fail(&mut self, message: &str) -> ProgressResult<()> {
        self.base_mut().fail(message)
    }

    fn update(&mut self, step: Step) -> ProgressResult<()> {
        self.base_mut().update(step)
    }

    fn increment(&mut self, steps: Step) -> ProgressResult<()> {
        self.base_mut().increment(steps)
    }

    fn set_stage(&mut self, stage: ProgressStage, progress: f64) -> ProgressResult<()> {
        self.base_mut().set_stage(stage, progress)
    }

    fn update_stage_progress(&mut self, progress: f64) -> ProgressResult<()> {
        self.base_mut().update_stage_progress(progress)
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn state(&self) -> ProgressState {
        self.base().state()
    }

    fn current_stage(&self) -> ProgressStage {
        self.base().current_stage()
    }

    fn current_step(&self) -> Step {
        self.base().current_step()
    }

    fn progress_percentage(&self) -> f64 {
        self.base().progress_percentage()
    }

    fn elapsed_time(&self) -> Duration {
        self.base().elapsed_time()
    }

    fn estimated_time_remaining(&self) -> Option<Duration> {
        self.base().estimated_time_remaining()
    }

    fn messages(&self) -> &[ProgressMessage] {
        self.base().messages()
    }

    fn errors(&self) -> &[ProgressMessage] {
        self.base().errors()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::of(self.base(), self.kind())
    }

    /// Render the current snapshot
    fn render(&self, renderer: &dyn ProgressRenderer) -> String {
        renderer.render(&self.snapshot())
    }
}

impl Tracker for ProgressTracker {
    fn kind(&self) -> &'static str {
        "simple"
    }

    fn base(&self) -> &ProgressTracker {
        self
    }

    fn base_mut(&mut self) -> &mut ProgressTracker {
        self
    }
}

impl Tracker for AnalyzerProgressTracker {
    fn kind(&self) -> &'static str {
        "analyzer"
    }

    fn base(&self) -> &ProgressTracker {
        AnalyzerProgressTracker::base(self)
    }

    fn base_mut(&mut self) -> &mut ProgressTracker {
        AnalyzerProgressTracker::base_mut(self)
    }

    fn as_analyzer_mut(&mut self) -> Option<&mut AnalyzerProgressTracker> {
        Some(self)
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let units = self
            .units()
            .iter()
            .map(|unit| UnitSnapshot {
                name: unit.name.clone(),
                weight: self.normalized_weight(&unit.name).unwrap_or(0.0),
                progress: unit.progress,
                status: unit.status.clone(),
                completed: self.is_analyzer_complete(&unit.name),
            })
            .collect();
        ProgressSnapshot::of(Tracker::base(self), self.kind()).with_units(units)
    }
}
