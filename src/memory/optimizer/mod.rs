/*!
 * Memory Optimizer
 * Structural memory reductions for types and collections
 *
 * Strategies are composed as wrappers at construction time:
 * - **slots**: compact instances on creation and recycle
 * - **pooling**: bounded instance pool with reset-on-return
 * - **caching / lazy_loading**: per-instance memoized methods and properties
 * - **weak_refs**: weak tracking of shared instances
 * - **gc_optimization**: pools and caches register with the collector
 * - **limit_collection**: hard caps for collections
 */

pub mod cache;
pub mod class;
pub mod collections;
pub mod operation;
pub mod pool;
pub mod weak;

pub use cache::{
    is_cacheable_method, CacheKey, InstanceCache, LazyProperty, MethodCache, PropertyCache, Unkeyed,
};
pub use class::{
    CachedMethod, CachedProperty, ClassReport, Instance, Layout, Optimizable, OptimizedClass,
    SkippedStrategy,
};
pub use collections::{cap_collections, BoundedCollection, CollectionReport};
pub use operation::{OperationGuard, OperationSummary};
pub use pool::{ObjectPool, PoolStats};
pub use weak::WeakRegistry;

use super::config::env_or;
use super::monitor::ResourceMonitor;
use super::types::ResourceError;
use crate::core::limits::{DEFAULT_CACHE_SIZE, DEFAULT_MAX_COLLECTION_SIZE, DEFAULT_POOL_SIZE};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Independent optimization tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    Slots,
    WeakRefs,
    Pooling,
    LazyLoading,
    Caching,
    GcOptimization,
    LimitCollection,
    Compression,
    OnDemand,
}

impl OptimizationStrategy {
    pub const ALL: [OptimizationStrategy; 9] = [
        OptimizationStrategy::Slots,
        OptimizationStrategy::WeakRefs,
        OptimizationStrategy::Pooling,
        OptimizationStrategy::LazyLoading,
        OptimizationStrategy::Caching,
        OptimizationStrategy::GcOptimization,
        OptimizationStrategy::LimitCollection,
        OptimizationStrategy::Compression,
        OptimizationStrategy::OnDemand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStrategy::Slots => "slots",
            OptimizationStrategy::WeakRefs => "weak_refs",
            OptimizationStrategy::Pooling => "pooling",
            OptimizationStrategy::LazyLoading => "lazy_loading",
            OptimizationStrategy::Caching => "caching",
            OptimizationStrategy::GcOptimization => "gc_optimization",
            OptimizationStrategy::LimitCollection => "limit_collection",
            OptimizationStrategy::Compression => "compression",
            OptimizationStrategy::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationStrategy {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptimizationStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ResourceError::InvalidThreshold(format!("unknown optimization strategy '{}'", s))
            })
    }
}

/// Optimization level; each level includes everything below it
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    None,
    Minimal,
    #[default]
    Moderate,
    Aggressive,
    Extreme,
}

impl OptimizationLevel {
    /// Strategies implied by this level
    pub fn strategies(self) -> BTreeSet<OptimizationStrategy> {
        use OptimizationStrategy::*;

        let mut set = BTreeSet::new();
        if self >= OptimizationLevel::Minimal {
            set.extend([Slots, GcOptimization]);
        }
        if self >= OptimizationLevel::Moderate {
            set.extend([Pooling, LimitCollection, WeakRefs]);
        }
        if self >= OptimizationLevel::Aggressive {
            set.extend([Caching, LazyLoading]);
        }
        if self >= OptimizationLevel::Extreme {
            set.extend([Compression, OnDemand]);
        }
        set
    }
}

impl FromStr for OptimizationLevel {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(OptimizationLevel::None),
            "minimal" => Ok(OptimizationLevel::Minimal),
            "moderate" => Ok(OptimizationLevel::Moderate),
            "aggressive" => Ok(OptimizationLevel::Aggressive),
            "extreme" => Ok(OptimizationLevel::Extreme),
            other => Err(ResourceError::InvalidThreshold(format!(
                "unknown optimization level '{}'",
                other
            ))),
        }
    }
}

/// Optimizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub level: OptimizationLevel,
    /// Explicit strategy set; overrides the level's defaults when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies: Option<BTreeSet<OptimizationStrategy>>,
    pub max_collection_size: usize,
    pub pool_size: usize,
    pub cache_size: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::default(),
            strategies: None,
            max_collection_size: DEFAULT_MAX_COLLECTION_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl OptimizationConfig {
    /// Load overrides from `SEO_OPTIMIZATION_LEVEL`, `SEO_MAX_COLLECTION_SIZE`,
    /// `SEO_POOL_SIZE` and `SEO_CACHE_SIZE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_or("SEO_OPTIMIZATION_LEVEL", defaults.level),
            strategies: None,
            max_collection_size: env_or("SEO_MAX_COLLECTION_SIZE", defaults.max_collection_size),
            pool_size: env_or("SEO_POOL_SIZE", defaults.pool_size),
            cache_size: env_or("SEO_CACHE_SIZE", defaults.cache_size),
        }
    }

    pub fn with_level(mut self, level: OptimizationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_strategies<I>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = OptimizationStrategy>,
    {
        self.strategies = Some(strategies.into_iter().collect());
        self
    }

    pub fn with_max_collection_size(mut self, max: usize) -> Self {
        self.max_collection_size = max;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Explicit strategies, or the level's defaults
    pub fn effective_strategies(&self) -> BTreeSet<OptimizationStrategy> {
        self.strategies
            .clone()
            .unwrap_or_else(|| self.level.strategies())
    }
}

/// Optimizer front end
pub struct MemoryOptimizer {
    config: OptimizationConfig,
    monitor: Arc<ResourceMonitor>,
    registry: DashMap<TypeId, ClassReport>,
}

impl MemoryOptimizer {
    /// Create an optimizer sharing the monitor's collector
    pub fn new(monitor: Arc<ResourceMonitor>, config: OptimizationConfig) -> Self {
        info!(
            level = ?config.level,
            max_collection_size = config.max_collection_size,
            pool_size = config.pool_size,
            "Memory optimizer initialized"
        );
        Self {
            config,
            monitor,
            registry: DashMap::new(),
        }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Wrap `T`'s construction with the given strategies (config defaults when `None`)
    pub fn optimize_class<T, F>(
        &self,
        factory: F,
        strategies: Option<&[OptimizationStrategy]>,
    ) -> OptimizedClass<T>
    where
        T: Optimizable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let strategies: BTreeSet<OptimizationStrategy> = match strategies {
            Some(explicit) => explicit.iter().copied().collect(),
            None => self.config.effective_strategies(),
        };

        if self.registry.contains_key(&TypeId::of::<T>()) {
            debug!(
                class = std::any::type_name::<T>(),
                "Type optimized again; previous wrapper stays valid"
            );
        }

        let class = OptimizedClass::build(
            factory,
            &strategies,
            self.config.pool_size,
            self.config.cache_size,
            self.monitor.collector(),
        );
        self.registry
            .insert(TypeId::of::<T>(), class.report().clone());
        class
    }

    /// Report for a previously optimized type
    pub fn class_report<T: 'static>(&self) -> Option<ClassReport> {
        self.registry
            .get(&TypeId::of::<T>())
            .map(|entry| entry.value().clone())
    }

    pub fn optimized_classes(&self) -> usize {
        self.registry.len()
    }

    /// Truncate each collection above `max_collection_size`
    pub fn optimize_collections(
        &self,
        collections: &mut [&mut dyn BoundedCollection],
    ) -> CollectionReport {
        let report = cap_collections(collections, self.config.max_collection_size);
        if report.truncated > 0 {
            warn!(
                truncated = report.truncated,
                items_removed = report.items_removed,
                max = self.config.max_collection_size,
                "Collections truncated to size cap"
            );
        }
        report
    }

    /// Measure usage across a scoped operation
    ///
    /// With `gc_optimization` a collection runs when the scope ends.
    pub fn monitor_operation(&self, name: &str) -> OperationGuard {
        let collect = self
            .config
            .effective_strategies()
            .contains(&OptimizationStrategy::GcOptimization);
        OperationGuard::begin(Arc::clone(&self.monitor), name, collect)
    }
}
