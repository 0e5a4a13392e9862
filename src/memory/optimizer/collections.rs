/*!
 * Collection Capping
 * Lossy in-place truncation of oversized collections
 */

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};

/// Collection that can be truncated in place
pub trait BoundedCollection {
    fn item_count(&self) -> usize;

    /// Keep at most `max` items; returns the number removed
    fn truncate_to(&mut self, max: usize) -> usize;
}

impl<T> BoundedCollection for Vec<T> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn truncate_to(&mut self, max: usize) -> usize {
        let removed = self.len().saturating_sub(max);
        if removed > 0 {
            self.truncate(max);
            self.shrink_to_fit();
        }
        removed
    }
}

impl<T> BoundedCollection for VecDeque<T> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn truncate_to(&mut self, max: usize) -> usize {
        let removed = self.len().saturating_sub(max);
        if removed > 0 {
            self.truncate(max);
            self.shrink_to_fit();
        }
        removed
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> BoundedCollection for IndexMap<K, V, S> {
    fn item_count(&self) -> usize {
        self.len()
    }

    /// Keeps the first `max` keys in insertion order
    fn truncate_to(&mut self, max: usize) -> usize {
        let removed = self.len().saturating_sub(max);
        if removed > 0 {
            self.truncate(max);
            self.shrink_to_fit();
        }
        removed
    }
}

impl<T: Eq + Hash, S: BuildHasher> BoundedCollection for IndexSet<T, S> {
    fn item_count(&self) -> usize {
        self.len()
    }

    /// Keeps the first `max` items in insertion order
    fn truncate_to(&mut self, max: usize) -> usize {
        let removed = self.len().saturating_sub(max);
        if removed > 0 {
            self.truncate(max);
            self.shrink_to_fit();
        }
        removed
    }
}

/// Unordered map; use [`IndexMap`] when the kept keys must be the first inserted
impl<K: Eq + Hash + Clone, V, S: BuildHasher> BoundedCollection for HashMap<K, V, S> {
    fn item_count(&self) -> usize {
        self.len()
    }

    /// Drops an arbitrary set of keys, leaving `max`
    fn truncate_to(&mut self, max: usize) -> usize {
        if self.len() <= max {
            return 0;
        }
        let excess: Vec<K> = self.keys().skip(max).cloned().collect();
        for key in &excess {
            self.remove(key);
        }
        self.shrink_to_fit();
        excess.len()
    }
}

impl<T: Eq + Hash, S: BuildHasher + Default> BoundedCollection for HashSet<T, S> {
    fn item_count(&self) -> usize {
        self.len()
    }

    /// Rebuilds from the first `max` iterated items
    fn truncate_to(&mut self, max: usize) -> usize {
        if self.len() <= max {
            return 0;
        }
        let removed = self.len() - max;
        let kept: HashSet<T, S> = std::mem::take(self).into_iter().take(max).collect();
        *self = kept;
        removed
    }
}

impl<K: Ord + Clone, V> BoundedCollection for BTreeMap<K, V> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn truncate_to(&mut self, max: usize) -> usize {
        if self.len() <= max {
            return 0;
        }
        let removed = self.len() - max;
        if let Some(first_excess) = self.keys().nth(max).cloned() {
            self.split_off(&first_excess);
        }
        removed
    }
}

impl<T: Ord + Clone> BoundedCollection for BTreeSet<T> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn truncate_to(&mut self, max: usize) -> usize {
        if self.len() <= max {
            return 0;
        }
        let removed = self.len() - max;
        if let Some(first_excess) = self.iter().nth(max).cloned() {
            self.split_off(&first_excess);
        }
        removed
    }
}

/// Outcome of capping a batch of collections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub inspected: usize,
    pub truncated: usize,
    pub items_removed: usize,
}

/// Truncate each collection above `max` items
pub fn cap_collections(
    collections: &mut [&mut dyn BoundedCollection],
    max: usize,
) -> CollectionReport {
    let mut report = CollectionReport::default();
    for collection in collections.iter_mut() {
        report.inspected += 1;
        if collection.item_count() > max {
            report.truncated += 1;
            report.items_removed += collection.truncate_to(max);
        }
    }
    report
}
