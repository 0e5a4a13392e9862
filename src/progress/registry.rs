/*!
 * Tracker Registry
 * Name-keyed factory for tracker variants
 *
 * Built-in kinds:
 * - `simple`: [`ProgressTracker`]
 * - `analyzer`: [`AnalyzerProgressTracker`]
 */

use super::analyzer::AnalyzerProgressTracker;
use super::estimator::EstimatorConfig;
use super::traits::Tracker;
use super::tracker::ProgressTracker;
use super::types::{ProgressError, ProgressResult, StageWeights};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::types::Step;
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;
use tracing::debug;

/// Construction parameters shared by all tracker kinds
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub name: String,
    pub total_steps: Step,
    pub weights: StageWeights,
    pub estimator: EstimatorConfig,
    pub clock: SharedClock,
}

impl TrackerOptions {
    pub fn new(name: impl Into<String>, total_steps: Step) -> Self {
        Self {
            name: name.into(),
            total_steps,
            weights: StageWeights::default(),
            estimator: EstimatorConfig::default(),
            clock: system_clock(),
        }
    }

    pub fn with_weights(mut self, weights: StageWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Base tracker configured from these options
    pub fn build_base(&self) -> ProgressTracker {
        ProgressTracker::new(self.name.clone(), self.total_steps)
            .with_weights(self.weights)
            .with_estimator(self.estimator.clone())
            .with_clock(Arc::clone(&self.clock))
    }
}

/// Tracker constructor
pub type TrackerFactory = Arc<dyn Fn(&TrackerOptions) -> Box<dyn Tracker> + Send + Sync>;

pub struct TrackerRegistry {
    factories: HashMap<String, TrackerFactory>,
}

impl TrackerRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `simple` and `analyzer` kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("simple", |options: &TrackerOptions| {
            Box::new(options.build_base()) as Box<dyn Tracker>
        });
        registry.register("analyzer", |options: &TrackerOptions| {
            Box::new(AnalyzerProgressTracker::from_tracker(options.build_base())) as Box<dyn Tracker>
        });
        registry
    }

    /// Register or replace a kind
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&TrackerOptions) -> Box<dyn Tracker> + Send + Sync + 'static,
    {
        debug!(kind, "Tracker kind registered");
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn create(&self, kind: &str, options: &TrackerOptions) -> ProgressResult<Box<dyn Tracker>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ProgressError::UnknownTracker(kind.to_string()))?;
        Ok(factory(options))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Create a built-in tracker with default weights and the system clock
pub fn create_tracker(
    kind: &str,
    name: impl Into<String>,
    total_steps: Step,
) -> ProgressResult<Box<dyn Tracker>> {
    TrackerRegistry::with_builtins().create(kind, &TrackerOptions::new(name, total_steps))
}
