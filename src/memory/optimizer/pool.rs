/*!
 * Object Pool
 * Bounded lock-free pool of reusable instances
 */

use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    /// Acquisitions served from the pool
    pub hits: u64,
    /// Acquisitions that needed a fresh instance
    pub misses: u64,
    /// Releases dropped because the pool was full
    pub dropped: u64,
}

impl PoolStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fixed-capacity pool; never grows past `capacity`
pub struct ObjectPool<T> {
    queue: ArrayQueue<T>,
    hits: AtomicU64,
    misses: AtomicU64,
    dropped: AtomicU64,
}

impl<T> ObjectPool<T> {
    /// Create a pool; `capacity` must be non-zero
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Take a pooled instance if one is available
    #[inline]
    pub fn acquire(&self) -> Option<T> {
        match self.queue.pop() {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return an instance; dropped silently when full. Returns true if pooled.
    #[inline]
    pub fn release(&self, value: T) -> bool {
        match self.queue.push(value) {
            Ok(()) => true,
            Err(_rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Drop all pooled instances; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        while self.queue.pop().is_some() {
            cleared += 1;
        }
        cleared
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            available: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
