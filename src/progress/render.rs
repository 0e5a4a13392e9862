/*!
 * Progress Rendering
 * Serializable snapshots and text/JSON renderers
 */

use super::tracker::ProgressTracker;
use super::types::{ProgressStage, ProgressState};
use crate::core::serde::{duration_secs, is_empty_vec, optional_duration_secs};
use crate::core::types::Step;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// One stage row of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: ProgressStage,
    pub weight: f64,
    pub progress: f64,
}

/// One analyzer row of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub name: String,
    /// Normalized weight
    pub weight: f64,
    pub progress: f64,
    pub status: String,
    pub completed: bool,
}

/// Point-in-time view of a tracker, consumed by renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub name: String,
    pub kind: String,
    pub state: ProgressState,
    pub stage: ProgressStage,
    pub current_step: Step,
    pub total_steps: Step,
    pub percentage: f64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    #[serde(with = "optional_duration_secs")]
    pub remaining: Option<Duration>,
    pub stages: Vec<StageSnapshot>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub units: Vec<UnitSnapshot>,
    pub message_count: usize,
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub errors: Vec<String>,
}

impl ProgressSnapshot {
    pub fn of(tracker: &ProgressTracker, kind: &str) -> Self {
        let stages = ProgressStage::ALL
            .into_iter()
            .map(|stage| StageSnapshot {
                stage,
                weight: tracker.weights().get(stage),
                progress: tracker.stage_progress(stage),
            })
            .collect();

        Self {
            name: tracker.name().to_string(),
            kind: kind.to_string(),
            state: tracker.state(),
            stage: tracker.current_stage(),
            current_step: tracker.current_step(),
            total_steps: tracker.total_steps(),
            percentage: tracker.progress_percentage(),
            elapsed: tracker.elapsed_time(),
            remaining: tracker.estimated_time_remaining(),
            stages,
            units: Vec::new(),
            message_count: tracker.messages().len(),
            last_message: tracker.messages().last().map(|m| m.text.clone()),
            errors: tracker.errors().iter().map(|e| e.text.clone()).collect(),
        }
    }

    pub fn with_units(mut self, units: Vec<UnitSnapshot>) -> Self {
        self.units = units;
        self
    }
}

/// Turns a snapshot into display text
pub trait ProgressRenderer {
    fn render(&self, snapshot: &ProgressSnapshot) -> String;
}

/// Human-readable bar plus optional stage and analyzer tables
#[derive(Debug, Clone)]
pub struct TextRenderer {
    pub bar_width: usize,
    pub show_stages: bool,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            bar_width: 30,
            show_stages: true,
        }
    }
}

impl TextRenderer {
    /// Single-line variant
    pub fn compact() -> Self {
        Self {
            show_stages: false,
            ..Self::default()
        }
    }

    fn bar(&self, percentage: f64) -> String {
        let width = self.bar_width.max(1);
        let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
        format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled.min(width)))
    }
}

/// `1h02m03s`, `2m03s`, or `4.5s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

impl ProgressRenderer for TextRenderer {
    fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let mut out = String::new();
        let eta = snapshot
            .remaining
            .map(format_duration)
            .unwrap_or_else(|| "--".to_string());

        let _ = write!(
            out,
            "{} {} {:5.1}% ({}/{}) {} | {} | elapsed {} | eta {}",
            snapshot.name,
            self.bar(snapshot.percentage),
            snapshot.percentage,
            snapshot.current_step,
            snapshot.total_steps,
            snapshot.state,
            snapshot.stage,
            format_duration(snapshot.elapsed),
            eta
        );

        if self.show_stages {
            for row in &snapshot.stages {
                let marker = if row.stage == snapshot.stage { '>' } else { ' ' };
                let _ = write!(
                    out,
                    "\n {} {:<15} {:5.1}%  weight {:.2}",
                    marker,
                    row.stage.as_str(),
                    row.progress * 100.0,
                    row.weight
                );
            }
            for unit in &snapshot.units {
                let mark = if unit.completed { '*' } else { '-' };
                let _ = write!(
                    out,
                    "\n   {} {:<20} {:5.1}%  {}",
                    mark,
                    unit.name,
                    unit.progress * 100.0,
                    unit.status
                );
            }
        }

        for error in &snapshot.errors {
            let _ = write!(out, "\n ! {}", error);
        }
        out
    }
}

/// JSON rendering of the snapshot
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
    pub pretty: bool,
}

impl ProgressRenderer for JsonRenderer {
    fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(snapshot)
        } else {
            serde_json::to_string(snapshot)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}
