/*!
 * Method Caching
 * Per-instance memoization tables and lazy properties
 *
 * Wrappers are composed once when a method is registered on an
 * [`OptimizedClass`](super::OptimizedClass); the wrapped type is never
 * modified. Arguments that cannot produce a key (see [`CacheKey`]) run
 * uncached.
 */

use dashmap::DashMap;
use moka::sync::Cache;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Method name prefixes that mark mutating or private methods
const UNCACHEABLE_PREFIXES: [&str; 6] = ["set_", "delete_", "remove_", "clear_", "update_", "_"];

/// Check if a method name is eligible for memoization
pub fn is_cacheable_method(name: &str) -> bool {
    !name.is_empty()
        && !UNCACHEABLE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// Arguments usable as a memoization key
///
/// `cache_key` returns `None` for values that have no stable key (NaN floats,
/// [`Unkeyed`] wrappers); the call then runs uncached.
pub trait CacheKey {
    type Key: Hash + Eq + Clone + Send + Sync + 'static;

    fn cache_key(&self) -> Option<Self::Key>;
}

macro_rules! identity_cache_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheKey for $ty {
                type Key = $ty;

                #[inline]
                fn cache_key(&self) -> Option<Self::Key> {
                    Some(self.clone())
                }
            }
        )*
    };
}

identity_cache_key!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String
);

impl CacheKey for str {
    type Key = String;

    fn cache_key(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl CacheKey for f64 {
    type Key = u64;

    fn cache_key(&self) -> Option<u64> {
        if self.is_nan() {
            None
        } else {
            // Fold -0.0 into 0.0
            Some((self + 0.0).to_bits())
        }
    }
}

impl CacheKey for f32 {
    type Key = u32;

    fn cache_key(&self) -> Option<u32> {
        if self.is_nan() {
            None
        } else {
            Some((self + 0.0).to_bits())
        }
    }
}

impl<T: CacheKey + ?Sized> CacheKey for &T {
    type Key = T::Key;

    fn cache_key(&self) -> Option<Self::Key> {
        (**self).cache_key()
    }
}

impl<T: CacheKey> CacheKey for Option<T> {
    type Key = Option<T::Key>;

    fn cache_key(&self) -> Option<Self::Key> {
        match self {
            Some(value) => value.cache_key().map(Some),
            None => Some(None),
        }
    }
}

impl<T: CacheKey> CacheKey for Vec<T> {
    type Key = Vec<T::Key>;

    fn cache_key(&self) -> Option<Self::Key> {
        self.iter().map(CacheKey::cache_key).collect()
    }
}

impl<T: CacheKey> CacheKey for [T] {
    type Key = Vec<T::Key>;

    fn cache_key(&self) -> Option<Self::Key> {
        self.iter().map(CacheKey::cache_key).collect()
    }
}

impl<A: CacheKey, B: CacheKey> CacheKey for (A, B) {
    type Key = (A::Key, B::Key);

    fn cache_key(&self) -> Option<Self::Key> {
        Some((self.0.cache_key()?, self.1.cache_key()?))
    }
}

impl<A: CacheKey, B: CacheKey, C: CacheKey> CacheKey for (A, B, C) {
    type Key = (A::Key, B::Key, C::Key);

    fn cache_key(&self) -> Option<Self::Key> {
        Some((self.0.cache_key()?, self.1.cache_key()?, self.2.cache_key()?))
    }
}

/// Wrapper for arguments that must never be used as a key
#[derive(Debug, Clone)]
pub struct Unkeyed<T>(pub T);

impl<T> CacheKey for Unkeyed<T> {
    type Key = ();

    fn cache_key(&self) -> Option<()> {
        None
    }
}

/// Type-erased view used for invalidation and collection
pub trait InstanceCache: Send + Sync {
    /// Drop every entry for one instance
    fn invalidate(&self, instance: u64) -> usize;

    /// Drop every entry
    fn clear(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded memo table keyed by (instance id, argument key)
///
/// Eviction is moka's TinyLFU. Hit and miss counts are kept alongside since
/// the sync cache does not record them.
pub struct MethodCache<K, R> {
    entries: Cache<(u64, K), R>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, R> MethodCache<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Cache::builder().max_capacity(capacity as u64).build(),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, instance: u64, key: &K) -> Option<R> {
        let found = self.entries.get(&(instance, key.clone()));
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, instance: u64, key: K, value: R) {
        self.entries.insert((instance, key), value);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn invalidate_where(&self, matches: impl Fn(u64) -> bool) -> usize {
        let stale: Vec<Arc<(u64, K)>> = self
            .entries
            .iter()
            .filter(|(key, _)| matches(key.0))
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_ref());
        }
        self.entries.run_pending_tasks();
        stale.len()
    }
}

impl<K, R> InstanceCache for MethodCache<K, R>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, instance: u64) -> usize {
        self.invalidate_where(|owner| owner == instance)
    }

    fn clear(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    fn len(&self) -> usize {
        // Apply pending inserts and evictions before counting
        self.entries.run_pending_tasks();
        self.entries.iter().count()
    }
}

/// Value computed on first access and kept afterwards
///
/// Concurrent first accesses run the initializer once.
pub struct LazyProperty<T> {
    cell: OnceLock<T>,
}

impl<T> LazyProperty<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get_or_init<F: FnOnce() -> T>(&self, init: F) -> &T {
        self.cell.get_or_init(init)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for LazyProperty<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`LazyProperty`] per instance for a single property
pub struct PropertyCache<R> {
    slots: DashMap<u64, Arc<LazyProperty<R>>>,
}

impl<R: Clone + Send + Sync + 'static> PropertyCache<R> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Value for `instance`, computing it on first access
    pub fn get_or_init<F: FnOnce() -> R>(&self, instance: u64, init: F) -> R {
        // Clone the slot out so the shard lock is not held while computing
        let slot = Arc::clone(self.slots.entry(instance).or_default().value());
        slot.get_or_init(init).clone()
    }
}

impl<R: Clone + Send + Sync + 'static> Default for PropertyCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send + Sync + 'static> InstanceCache for PropertyCache<R> {
    fn invalidate(&self, instance: u64) -> usize {
        self.slots
            .remove(&instance)
            .map(|(_, slot)| usize::from(slot.is_initialized()))
            .unwrap_or(0)
    }

    fn clear(&self) -> usize {
        let cleared = self.len();
        self.slots.clear();
        cleared
    }

    fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().is_initialized())
            .count()
    }
}
