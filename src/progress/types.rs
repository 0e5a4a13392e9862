/*!
 * Progress Types
 * States, stages, stage weights, messages, and errors for progress tracking
 */

use crate::core::limits::WEIGHT_SUM_TOLERANCE;
use crate::core::serde::system_time_micros;
use crate::core::types::Step;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Progress operation result
pub type ProgressResult<T> = Result<T, ProgressError>;

/// Progress tracking errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProgressError {
    #[error("Tracker '{tracker}' cannot {operation} while {from}")]
    #[diagnostic(
        code(progress::invalid_transition),
        help("Start the tracker before updating it; terminal states accept no further changes.")
    )]
    InvalidTransition {
        tracker: String,
        from: ProgressState,
        operation: String,
    },

    #[error("Step {step} out of range [0, {total}]")]
    #[diagnostic(code(progress::step_out_of_range))]
    StepOutOfRange { step: Step, total: Step },

    #[error("Progress {value} out of range [0.0, 1.0]")]
    #[diagnostic(code(progress::progress_out_of_range))]
    ProgressOutOfRange { value: f64 },

    #[error("Invalid weights: {0}")]
    #[diagnostic(
        code(progress::invalid_weights),
        help("Weights must be finite and non-negative; stage weights must sum to 1.0.")
    )]
    InvalidWeights(String),

    #[error("Unknown tracker kind: {0}")]
    #[diagnostic(
        code(progress::unknown_tracker),
        help("Built-in kinds are 'simple' and 'analyzer'.")
    )]
    UnknownTracker(String),
}

/// Validate a fraction in `[0.0, 1.0]`
pub(crate) fn check_fraction(value: f64) -> ProgressResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ProgressError::ProgressOutOfRange { value })
    }
}

/// Tracker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    NotStarted,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressState::NotStarted => "not_started",
            ProgressState::Running => "running",
            ProgressState::Paused => "paused",
            ProgressState::Completed => "completed",
            ProgressState::Failed => "failed",
            ProgressState::Cancelled => "cancelled",
        }
    }

    /// Completed, failed, or cancelled
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressState::Completed | ProgressState::Failed | ProgressState::Cancelled
        )
    }

    /// Running or paused
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, ProgressState::Running | ProgressState::Paused)
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Initialization,
    Collection,
    Processing,
    Analysis,
    Reporting,
    Cleanup,
}

impl ProgressStage {
    pub const COUNT: usize = 6;

    pub const ALL: [ProgressStage; Self::COUNT] = [
        ProgressStage::Initialization,
        ProgressStage::Collection,
        ProgressStage::Processing,
        ProgressStage::Analysis,
        ProgressStage::Reporting,
        ProgressStage::Cleanup,
    ];

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Initialization => "initialization",
            ProgressStage::Collection => "collection",
            ProgressStage::Processing => "processing",
            ProgressStage::Analysis => "analysis",
            ProgressStage::Reporting => "reporting",
            ProgressStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStage {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProgressStage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProgressError::InvalidWeights(format!("unknown stage '{}'", s)))
    }
}

/// Per-stage weights summing to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 6]", into = "[f64; 6]")]
pub struct StageWeights([f64; ProgressStage::COUNT]);

impl StageWeights {
    /// Validate weights indexed in stage order
    pub fn new(weights: [f64; ProgressStage::COUNT]) -> ProgressResult<Self> {
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ProgressError::InvalidWeights(format!(
                "weight {} is negative or not finite",
                bad
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ProgressError::InvalidWeights(format!(
                "stage weights sum to {:.6}, expected 1.0",
                sum
            )));
        }
        Ok(Self(weights))
    }

    /// Build from (stage, weight) pairs; unlisted stages weigh zero
    pub fn from_pairs(pairs: &[(ProgressStage, f64)]) -> ProgressResult<Self> {
        let mut weights = [0.0; ProgressStage::COUNT];
        for (stage, weight) in pairs {
            weights[stage.index()] = *weight;
        }
        Self::new(weights)
    }

    #[inline]
    pub fn get(&self, stage: ProgressStage) -> f64 {
        self.0[stage.index()]
    }

    pub fn as_array(&self) -> &[f64; ProgressStage::COUNT] {
        &self.0
    }

    /// Weighted sum of per-stage progress
    pub fn weighted_sum(&self, progress: &[f64; ProgressStage::COUNT]) -> f64 {
        self.0.iter().zip(progress).map(|(w, p)| w * p).sum()
    }
}

impl Default for StageWeights {
    fn default() -> Self {
        Self([0.05, 0.15, 0.2, 0.4, 0.15, 0.05])
    }
}

impl TryFrom<[f64; ProgressStage::COUNT]> for StageWeights {
    type Error = ProgressError;

    fn try_from(weights: [f64; ProgressStage::COUNT]) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<StageWeights> for [f64; ProgressStage::COUNT] {
    fn from(weights: StageWeights) -> Self {
        weights.0
    }
}

/// Entry in a tracker's message or error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub text: String,
    pub stage: ProgressStage,
    /// Tracker elapsed time when logged
    #[serde(with = "crate::core::serde::duration_secs")]
    pub elapsed: Duration,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
}
