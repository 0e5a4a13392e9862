/*!
 * Analyzer Progress Tracker
 * Per-analyzer progress rolled up into the analysis stage
 *
 * Wraps a [`ProgressTracker`] and adds named units with weights, status
 * strings, and merged metrics. While the tracker is running in the
 * `analysis` stage, every unit update sets the stage progress to the
 * weighted sum of unit progress.
 */

use super::tracker::ProgressTracker;
use super::types::{check_fraction, ProgressError, ProgressResult, ProgressStage, ProgressState};
use crate::core::types::{Metadata, Step};
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default weight of a registered analyzer
pub const DEFAULT_ANALYZER_WEIGHT: f64 = 1.0;

/// Progress of one analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerUnit {
    pub name: String,
    /// Raw weight; normalized against the sum of all weights
    pub weight: f64,
    pub progress: f64,
    pub status: String,
    pub metrics: Metadata,
}

impl AnalyzerUnit {
    fn new(name: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            weight,
            progress: 0.0,
            status: "pending".to_string(),
            metrics: Metadata::new(),
        }
    }
}

pub struct AnalyzerProgressTracker {
    base: ProgressTracker,
    units: Vec<AnalyzerUnit>,
    index: HashMap<String, usize>,
    completed: HashSet<String>,
}

impl AnalyzerProgressTracker {
    pub fn new(name: impl Into<String>, total_steps: Step) -> Self {
        Self::from_tracker(ProgressTracker::new(name, total_steps))
    }

    /// Wrap a configured base tracker
    pub fn from_tracker(base: ProgressTracker) -> Self {
        Self {
            base,
            units: Vec::new(),
            index: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    pub fn base(&self) -> &ProgressTracker {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ProgressTracker {
        &mut self.base
    }

    pub fn into_inner(self) -> ProgressTracker {
        self.base
    }

    /// Register an analyzer; re-registering a known name is a no-op
    pub fn register_analyzer(&mut self, name: &str, weight: f64) -> ProgressResult<()> {
        if self.index.contains_key(name) {
            return Ok(());
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ProgressError::InvalidWeights(format!(
                "analyzer '{}' weight {} must be positive",
                name, weight
            )));
        }

        self.index.insert(name.to_string(), self.units.len());
        self.units.push(AnalyzerUnit::new(name, weight));
        debug!(tracker = %self.base.name(), analyzer = name, weight, "Analyzer registered");
        self.sync_analysis_stage()
    }

    /// Set one analyzer's progress, registering it with the default weight if unknown
    pub fn set_analyzer_progress(
        &mut self,
        name: &str,
        progress: f64,
        status: impl Into<String>,
    ) -> ProgressResult<()> {
        let progress = check_fraction(progress)?;
        self.register_analyzer(name, DEFAULT_ANALYZER_WEIGHT)?;

        let status = status.into();
        if let Some(unit) = self.unit_mut(name) {
            unit.progress = progress;
            unit.status = status;
        }

        if progress >= 1.0 && self.completed.insert(name.to_string()) {
            info!(tracker = %self.base.name(), analyzer = name, "Analyzer completed");
            self.base.log_message(format!("Analyzer {} completed", name));
        }

        self.sync_analysis_stage()
    }

    /// Merge metrics into an analyzer's map
    pub fn set_analyzer_metrics(&mut self, name: &str, metrics: Metadata) -> ProgressResult<()> {
        self.register_analyzer(name, DEFAULT_ANALYZER_WEIGHT)?;
        if let Some(unit) = self.unit_mut(name) {
            unit.metrics.extend(metrics);
        }
        Ok(())
    }

    /// Weighted sum of unit progress
    pub fn analysis_progress(&self) -> f64 {
        let total_weight: f64 = self.units.iter().map(|u| u.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        self.units
            .iter()
            .map(|u| u.progress * u.weight / total_weight)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    /// Weight of an analyzer after normalization
    pub fn normalized_weight(&self, name: &str) -> Option<f64> {
        let total_weight: f64 = self.units.iter().map(|u| u.weight).sum();
        self.unit(name).map(|u| u.weight / total_weight)
    }

    pub fn unit(&self, name: &str) -> Option<&AnalyzerUnit> {
        self.index.get(name).map(|&i| &self.units[i])
    }

    pub fn analyzer_progress(&self, name: &str) -> Option<f64> {
        self.unit(name).map(|u| u.progress)
    }

    pub fn analyzer_status(&self, name: &str) -> Option<&str> {
        self.unit(name).map(|u| u.status.as_str())
    }

    pub fn analyzer_metrics(&self, name: &str) -> Option<&Metadata> {
        self.unit(name).map(|u| &u.metrics)
    }

    /// Units in registration order
    pub fn units(&self) -> &[AnalyzerUnit] {
        &self.units
    }

    pub fn analyzer_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.name.as_str())
    }

    pub fn is_analyzer_complete(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    fn unit_mut(&mut self, name: &str) -> Option<&mut AnalyzerUnit> {
        let index = *self.index.get(name)?;
        self.units.get_mut(index)
    }

    fn sync_analysis_stage(&mut self) -> ProgressResult<()> {
        if self.base.state() == ProgressState::Running
            && self.base.current_stage() == ProgressStage::Analysis
        {
            let progress = self.analysis_progress();
            self.base.update_stage_progress(progress)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AnalyzerProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerProgressTracker")
            .field("base", &self.base)
            .field("analyzers", &self.units.len())
            .field("completed", &self.completed.len())
            .finish()
    }
}
