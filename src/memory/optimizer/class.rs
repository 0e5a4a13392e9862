/*!
 * Optimized Classes
 * Strategy composition around a type's construction
 *
 * An [`OptimizedClass`] owns the factory for `T` and hands out [`Instance`]
 * handles. Pooling, compaction, per-instance caches and weak tracking are all
 * layered on the handle lifecycle; `T` itself is never changed.
 */

use super::cache::{is_cacheable_method, CacheKey, InstanceCache, MethodCache, PropertyCache};
use super::pool::{ObjectPool, PoolStats};
use super::weak::WeakRegistry;
use super::OptimizationStrategy;
use crate::memory::gc::GarbageCollector;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Storage model of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Fixed field set; nothing to compact
    Fixed,
    /// Holds growable storage that `compact` can shrink
    Dynamic,
}

/// Hooks a type exposes to the optimizer
pub trait Optimizable: Send + Sync + 'static {
    fn layout() -> Layout
    where
        Self: Sized,
    {
        Layout::Dynamic
    }

    /// Restore a recycled instance to its initial state
    fn reset(&mut self) {}

    /// Release spare capacity (e.g. `shrink_to_fit` on owned buffers)
    fn compact(&mut self) {}
}

/// Strategy that was requested but not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStrategy {
    pub strategy: OptimizationStrategy,
    pub reason: String,
}

/// What `optimize_class` did for one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassReport {
    pub type_name: String,
    pub applied: Vec<OptimizationStrategy>,
    pub skipped: Vec<SkippedStrategy>,
}

impl ClassReport {
    pub fn is_applied(&self, strategy: OptimizationStrategy) -> bool {
        self.applied.contains(&strategy)
    }
}

struct ClassInner<T: Optimizable> {
    type_name: &'static str,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    compact: bool,
    memoize: bool,
    cache_size: usize,
    pool: Option<ObjectPool<T>>,
    weak: Option<WeakRegistry<Instance<T>>>,
    caches: Mutex<Vec<Weak<dyn InstanceCache>>>,
    gc: Option<Arc<GarbageCollector>>,
    gc_ids: Mutex<Vec<u64>>,
    next_id: AtomicU64,
    created: AtomicU64,
}

impl<T: Optimizable> ClassInner<T> {
    fn invalidate(&self, instance: u64) {
        let mut caches = self.caches.lock();
        caches.retain(|cache| match cache.upgrade() {
            Some(cache) => {
                cache.invalidate(instance);
                true
            }
            None => false,
        });
    }
}

impl<T: Optimizable> Drop for ClassInner<T> {
    fn drop(&mut self) {
        if let Some(gc) = &self.gc {
            for id in self.gc_ids.lock().drain(..) {
                gc.unregister(id);
            }
        }
    }
}

/// Handle to an instance produced by an [`OptimizedClass`]
///
/// Dereferences to `T`. On drop the instance's cached results are
/// invalidated and, with pooling, the value is reset and returned to the pool.
pub struct Instance<T: Optimizable> {
    id: u64,
    value: Option<T>,
    class: Arc<ClassInner<T>>,
}

impl<T: Optimizable> Instance<T> {
    /// Unique id within the owning class
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detach the value from the class; it will not be pooled
    pub fn into_inner(mut self) -> T {
        self.class.invalidate(self.id);
        self.value
            .take()
            .expect("instance value present until drop")
    }
}

impl<T: Optimizable> Deref for Instance<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .expect("instance value present until drop")
    }
}

impl<T: Optimizable> DerefMut for Instance<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .expect("instance value present until drop")
    }
}

impl<T: Optimizable + fmt::Debug> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

impl<T: Optimizable> Drop for Instance<T> {
    fn drop(&mut self) {
        let Some(mut value) = self.value.take() else {
            return;
        };
        self.class.invalidate(self.id);

        if let Some(pool) = &self.class.pool {
            value.reset();
            if self.class.compact {
                value.compact();
            }
            pool.release(value);
        }
    }
}

/// Memoized method bound to an [`OptimizedClass`]
pub struct CachedMethod<T: Optimizable, A: CacheKey + ?Sized, R> {
    name: String,
    func: Box<dyn Fn(&T, &A) -> R + Send + Sync>,
    cache: Option<Arc<MethodCache<A::Key, R>>>,
    gc_registration: Option<(Arc<GarbageCollector>, u64)>,
}

impl<T, A, R> CachedMethod<T, A, R>
where
    T: Optimizable,
    A: CacheKey + ?Sized,
    R: Clone + Send + Sync + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether calls are memoized at all
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Call the method, returning a memoized result when available
    pub fn call(&self, instance: &Instance<T>, args: &A) -> R {
        let Some(cache) = &self.cache else {
            return (self.func)(&**instance, args);
        };
        let Some(key) = args.cache_key() else {
            return (self.func)(&**instance, args);
        };

        if let Some(hit) = cache.get(instance.id(), &key) {
            return hit;
        }
        let result = (self.func)(&**instance, args);
        cache.insert(instance.id(), key, result.clone());
        result
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    pub fn hits(&self) -> u64 {
        self.cache.as_ref().map(|c| c.hits()).unwrap_or(0)
    }
}

impl<T: Optimizable, A: CacheKey + ?Sized, R> Drop for CachedMethod<T, A, R> {
    fn drop(&mut self) {
        if let Some((gc, id)) = self.gc_registration.take() {
            gc.unregister(id);
        }
    }
}

/// Property computed on first access per instance
pub struct CachedProperty<T: Optimizable, R> {
    name: String,
    func: Box<dyn Fn(&T) -> R + Send + Sync>,
    cache: Option<Arc<PropertyCache<R>>>,
    gc_registration: Option<(Arc<GarbageCollector>, u64)>,
}

impl<T: Optimizable, R: Clone + Send + Sync + 'static> CachedProperty<T, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, instance: &Instance<T>) -> R {
        match &self.cache {
            Some(cache) => cache.get_or_init(instance.id(), || (self.func)(&**instance)),
            None => (self.func)(&**instance),
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Instances with a computed value
    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }
}

impl<T: Optimizable, R> Drop for CachedProperty<T, R> {
    fn drop(&mut self) {
        if let Some((gc, id)) = self.gc_registration.take() {
            gc.unregister(id);
        }
    }
}

/// A type wrapped with its optimization strategies
pub struct OptimizedClass<T: Optimizable> {
    inner: Arc<ClassInner<T>>,
    report: ClassReport,
}

impl<T: Optimizable> Clone for OptimizedClass<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            report: self.report.clone(),
        }
    }
}

impl<T: Optimizable> OptimizedClass<T> {
    pub(super) fn build<F>(
        factory: F,
        strategies: &BTreeSet<OptimizationStrategy>,
        pool_size: usize,
        cache_size: usize,
        gc: &Arc<GarbageCollector>,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut skip = |strategy, reason: &str| {
            skipped.push(SkippedStrategy {
                strategy,
                reason: reason.to_string(),
            })
        };

        let mut compact = false;
        let mut memoize = false;
        let mut pool = None;
        let mut weak = None;
        let mut collector = None;

        for &strategy in strategies {
            match strategy {
                OptimizationStrategy::Slots => {
                    if T::layout() == Layout::Fixed {
                        skip(strategy, "layout already fixed");
                        continue;
                    }
                    compact = true;
                }
                OptimizationStrategy::Pooling => {
                    if pool_size == 0 {
                        skip(strategy, "pool size is zero");
                        continue;
                    }
                    pool = Some(ObjectPool::new(pool_size));
                }
                OptimizationStrategy::Caching | OptimizationStrategy::LazyLoading => {
                    memoize = true;
                }
                OptimizationStrategy::WeakRefs => weak = Some(WeakRegistry::new()),
                OptimizationStrategy::GcOptimization => collector = Some(Arc::clone(gc)),
                OptimizationStrategy::LimitCollection => {
                    skip(strategy, "applies to collections, not types");
                    continue;
                }
                OptimizationStrategy::Compression | OptimizationStrategy::OnDemand => {
                    skip(strategy, "not supported for in-memory types");
                    continue;
                }
            }
            applied.push(strategy);
        }

        let inner = Arc::new(ClassInner {
            type_name,
            factory: Box::new(factory),
            compact,
            memoize,
            cache_size,
            pool,
            weak,
            caches: Mutex::new(Vec::new()),
            gc: collector,
            gc_ids: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
        });

        if let Some(gc) = &inner.gc {
            let weak_inner = Arc::downgrade(&inner);
            let id = gc.register(format!("{}::pool", type_name), move || {
                weak_inner
                    .upgrade()
                    .map(|class| {
                        let pooled = class.pool.as_ref().map(|p| p.clear()).unwrap_or(0);
                        let pruned = class.weak.as_ref().map(|w| w.prune()).unwrap_or(0);
                        pooled + pruned
                    })
                    .unwrap_or(0)
            });
            inner.gc_ids.lock().push(id);
        }

        debug!(
            class = type_name,
            applied = ?applied,
            skipped = skipped.len(),
            "Class optimized"
        );

        Self {
            inner,
            report: ClassReport {
                type_name: type_name.to_string(),
                applied,
                skipped,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    pub fn report(&self) -> &ClassReport {
        &self.report
    }

    pub fn has_strategy(&self, strategy: OptimizationStrategy) -> bool {
        self.report.is_applied(strategy)
    }

    /// Construct an instance, reusing a pooled one when available
    pub fn create(&self) -> Instance<T> {
        let recycled = self.inner.pool.as_ref().and_then(|pool| pool.acquire());
        let mut value = recycled.unwrap_or_else(|| {
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            (self.inner.factory)()
        });
        if self.inner.compact {
            value.compact();
        }

        Instance {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            value: Some(value),
            class: Arc::clone(&self.inner),
        }
    }

    /// Construct a shared instance, tracked weakly with `weak_refs`
    pub fn create_shared(&self) -> Arc<Instance<T>> {
        let instance = Arc::new(self.create());
        if let Some(weak) = &self.inner.weak {
            weak.track(&instance);
        }
        instance
    }

    /// Shared instances still alive (zero without `weak_refs`)
    pub fn live_instances(&self) -> usize {
        self.inner
            .weak
            .as_ref()
            .map(|w| w.live_count())
            .unwrap_or(0)
    }

    /// Number of values built by the factory (pool misses included)
    pub fn constructed(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool.as_ref().map(|p| p.len()).unwrap_or(0)
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.inner.pool.as_ref().map(|p| p.stats())
    }

    pub fn clear_pool(&self) -> usize {
        self.inner.pool.as_ref().map(|p| p.clear()).unwrap_or(0)
    }

    /// Wrap a method with per-instance memoization
    ///
    /// Mutating or private names (`set_*`, `update_*`, `_*`, ...) and classes
    /// without `caching` get a pass-through wrapper.
    pub fn cached_method<A, R, F>(&self, name: &str, func: F) -> CachedMethod<T, A, R>
    where
        A: CacheKey + ?Sized + 'static,
        R: Clone + Send + Sync + 'static,
        F: Fn(&T, &A) -> R + Send + Sync + 'static,
    {
        let cache = self
            .caches_enabled(name)
            .then(|| Arc::new(MethodCache::new(self.inner.cache_size)));
        let gc_registration = cache.as_ref().and_then(|cache| {
            let erased: Arc<dyn InstanceCache> = cache.clone();
            self.attach_cache(name, &erased)
        });

        CachedMethod {
            name: name.to_string(),
            func: Box::new(func),
            cache,
            gc_registration,
        }
    }

    /// Wrap a computed property so it is evaluated once per instance
    pub fn cached_property<R, F>(&self, name: &str, func: F) -> CachedProperty<T, R>
    where
        R: Clone + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let cache = self
            .caches_enabled(name)
            .then(|| Arc::new(PropertyCache::new()));
        let gc_registration = cache.as_ref().and_then(|cache| {
            let erased: Arc<dyn InstanceCache> = cache.clone();
            self.attach_cache(name, &erased)
        });

        CachedProperty {
            name: name.to_string(),
            func: Box::new(func),
            cache,
            gc_registration,
        }
    }

    fn caches_enabled(&self, name: &str) -> bool {
        self.inner.memoize && is_cacheable_method(name)
    }

    /// Track a cache for instance invalidation and hand its clear hook to the collector
    fn attach_cache(
        &self,
        name: &str,
        cache: &Arc<dyn InstanceCache>,
    ) -> Option<(Arc<GarbageCollector>, u64)> {
        self.inner.caches.lock().push(Arc::downgrade(cache));

        let gc = self.inner.gc.as_ref()?;
        let weak_cache = Arc::downgrade(cache);
        let id = gc.register(format!("{}::{}", self.inner.type_name, name), move || {
            weak_cache.upgrade().map(|c| c.clear()).unwrap_or(0)
        });
        Some((Arc::clone(gc), id))
    }
}
