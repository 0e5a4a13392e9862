/*!
 * Progress Tracker
 * Weighted multi-stage progress state machine
 *
 * ```text
 * not_started --start--> running <--pause/start--> paused
 *                           |                         |
 *                           +--complete/fail/cancel---+--> completed | failed | cancelled
 * ```
 *
 * Overall progress is derived from per-stage progress and weights:
 * after any stage update, `current_step == round(total * Σ progress·weight)`.
 * All transitions take `&mut self`; one pipeline drives one tracker.
 */

use super::estimator::{EstimatorConfig, RateEstimator};
use super::types::{
    check_fraction, ProgressError, ProgressMessage, ProgressResult, ProgressStage, ProgressState,
    StageWeights,
};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::types::Step;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

pub struct ProgressTracker {
    name: String,
    total_steps: Step,
    current_step: Step,
    state: ProgressState,
    current_stage: ProgressStage,
    stage_progress: [f64; ProgressStage::COUNT],
    weights: StageWeights,
    clock: SharedClock,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    ended_at: Option<Instant>,
    paused_total: Duration,
    messages: Vec<ProgressMessage>,
    errors: Vec<ProgressMessage>,
    estimator: RateEstimator,
}

impl ProgressTracker {
    pub fn new(name: impl Into<String>, total_steps: Step) -> Self {
        Self {
            name: name.into(),
            total_steps,
            current_step: 0,
            state: ProgressState::NotStarted,
            current_stage: ProgressStage::Initialization,
            stage_progress: [0.0; ProgressStage::COUNT],
            weights: StageWeights::default(),
            clock: system_clock(),
            started_at: None,
            paused_at: None,
            ended_at: None,
            paused_total: Duration::ZERO,
            messages: Vec::new(),
            errors: Vec::new(),
            estimator: RateEstimator::default(),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_weights(mut self, weights: StageWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_estimator(mut self, config: EstimatorConfig) -> Self {
        self.estimator = RateEstimator::new(config);
        self
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start, or resume from pause
    pub fn start(&mut self) -> ProgressResult<()> {
        let now = self.clock.now();
        match self.state {
            ProgressState::NotStarted => {
                self.started_at = Some(now);
                self.state = ProgressState::Running;
                info!(tracker = %self.name, total_steps = self.total_steps, "Progress started");
                self.log_message(format!("Started {}", self.name));
                Ok(())
            }
            ProgressState::Paused => {
                self.fold_pause(now);
                self.state = ProgressState::Running;
                debug!(tracker = %self.name, paused_ms = self.paused_total.as_millis() as u64, "Progress resumed");
                self.log_message("Resumed");
                Ok(())
            }
            from => Err(self.invalid("start", from)),
        }
    }

    pub fn pause(&mut self) -> ProgressResult<()> {
        self.require_running("pause")?;
        self.paused_at = Some(self.clock.now());
        self.state = ProgressState::Paused;
        debug!(tracker = %self.name, step = self.current_step, "Progress paused");
        self.log_message("Paused");
        Ok(())
    }

    /// Finish successfully; forces the step to the total
    pub fn complete(&mut self) -> ProgressResult<()> {
        self.finish("complete", ProgressState::Completed)?;
        self.current_step = self.total_steps;
        self.record_sample();
        info!(
            tracker = %self.name,
            elapsed_ms = self.elapsed_time().as_millis() as u64,
            "Progress completed"
        );
        self.log_message(format!("Completed {}", self.name));
        Ok(())
    }

    pub fn cancel(&mut self) -> ProgressResult<()> {
        self.finish("cancel", ProgressState::Cancelled)?;
        warn!(tracker = %self.name, step = self.current_step, "Progress cancelled");
        self.log_message("Cancelled");
        Ok(())
    }

    /// Finish with an error; the message is appended to the error log
    pub fn fail(&mut self, message: impl Into<String>) -> ProgressResult<()> {
        let message = message.into();
        self.finish("fail", ProgressState::Failed)?;
        error!(tracker = %self.name, stage = %self.current_stage, error = %message, "Progress failed");
        let entry = self.entry(message);
        self.errors.push(entry);
        Ok(())
    }

    /// Set the absolute step
    pub fn update(&mut self, step: Step) -> ProgressResult<()> {
        self.require_running("update")?;
        if step > self.total_steps {
            return Err(ProgressError::StepOutOfRange {
                step,
                total: self.total_steps,
            });
        }
        self.current_step = step;
        self.record_sample();
        Ok(())
    }

    /// Advance by `steps`, clamping at the total
    pub fn increment(&mut self, steps: Step) -> ProgressResult<()> {
        self.require_running("increment")?;
        self.current_step = self
            .current_step
            .saturating_add(steps)
            .min(self.total_steps);
        self.record_sample();
        Ok(())
    }

    /// Enter `stage` at `progress` and recompute the overall step
    pub fn set_stage(&mut self, stage: ProgressStage, progress: f64) -> ProgressResult<()> {
        self.require_running("set_stage")?;
        let progress = check_fraction(progress)?;

        if stage != self.current_stage {
            debug!(tracker = %self.name, from = %self.current_stage, to = %stage, "Stage changed");
            self.current_stage = stage;
            self.log_message(format!("Entered stage {}", stage));
        }
        self.stage_progress[stage.index()] = progress;
        self.recompute_step();
        Ok(())
    }

    /// Update progress of the current stage
    pub fn update_stage_progress(&mut self, progress: f64) -> ProgressResult<()> {
        self.set_stage(self.current_stage, progress)
    }

    /// Append to the message log
    pub fn log_message(&mut self, text: impl Into<String>) {
        let entry = self.entry(text.into());
        self.messages.push(entry);
    }

    /// Replace stage weights and recompute the overall step
    pub fn set_weights(&mut self, weights: StageWeights) {
        self.weights = weights;
        if self.state == ProgressState::Running {
            self.recompute_step();
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn current_stage(&self) -> ProgressStage {
        self.current_stage
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn total_steps(&self) -> Step {
        self.total_steps
    }

    pub fn weights(&self) -> &StageWeights {
        &self.weights
    }

    pub fn stage_progress(&self, stage: ProgressStage) -> f64 {
        self.stage_progress[stage.index()]
    }

    /// Weighted overall fraction from stage progress
    pub fn overall_fraction(&self) -> f64 {
        self.weights.weighted_sum(&self.stage_progress).clamp(0.0, 1.0)
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return if self.state == ProgressState::Completed {
                100.0
            } else {
                0.0
            };
        }
        self.current_step as f64 / self.total_steps as f64 * 100.0
    }

    /// Active time excluding pauses; frozen while paused or finished
    pub fn elapsed_time(&self) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self
            .ended_at
            .or(self.paused_at)
            .unwrap_or_else(|| self.clock.now());
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }

    /// Smoothed estimate of remaining active time
    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        match self.state {
            ProgressState::Completed => Some(Duration::ZERO),
            ProgressState::Running | ProgressState::Paused => self.estimator.estimate(),
            _ => None,
        }
    }

    /// Raw steps-per-second over the recent window
    pub fn rate(&self) -> Option<f64> {
        self.estimator.rate()
    }

    pub fn messages(&self) -> &[ProgressMessage] {
        &self.messages
    }

    pub fn errors(&self) -> &[ProgressMessage] {
        &self.errors
    }

    pub fn paused_duration(&self) -> Duration {
        match self.paused_at {
            Some(paused) => self.paused_total + self.clock.now().saturating_duration_since(paused),
            None => self.paused_total,
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn invalid(&self, operation: &str, from: ProgressState) -> ProgressError {
        ProgressError::InvalidTransition {
            tracker: self.name.clone(),
            from,
            operation: operation.to_string(),
        }
    }

    fn require_running(&self, operation: &str) -> ProgressResult<()> {
        if self.state == ProgressState::Running {
            Ok(())
        } else {
            Err(self.invalid(operation, self.state))
        }
    }

    fn fold_pause(&mut self, now: Instant) {
        if let Some(paused) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused);
        }
    }

    fn finish(&mut self, operation: &str, terminal: ProgressState) -> ProgressResult<()> {
        if !self.state.is_active() {
            return Err(self.invalid(operation, self.state));
        }
        let now = self.clock.now();
        self.fold_pause(now);
        self.ended_at = Some(now);
        self.state = terminal;
        Ok(())
    }

    fn recompute_step(&mut self) {
        let fraction = self.overall_fraction();
        self.current_step = ((self.total_steps as f64 * fraction).round() as Step).min(self.total_steps);
        self.record_sample();
    }

    fn record_sample(&mut self) {
        let elapsed = self.elapsed_time();
        self.estimator
            .record(elapsed, self.current_step, self.total_steps);
    }

    fn entry(&self, text: String) -> ProgressMessage {
        ProgressMessage {
            text,
            stage: self.current_stage,
            elapsed: self.elapsed_time(),
            timestamp: SystemTime::now(),
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("stage", &self.current_stage)
            .field("step", &self.current_step)
            .field("total_steps", &self.total_steps)
            .finish()
    }
}
