/*!
 * Weak Registry
 * Tracks live shared instances without keeping them alive
 */

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub struct WeakRegistry<T> {
    entries: Mutex<Vec<Weak<T>>>,
}

impl<T> WeakRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn track(&self, value: &Arc<T>) {
        let mut entries = self.entries.lock();
        // Opportunistic prune keeps the list proportional to live values
        if entries.len() >= 64 && entries.len().is_power_of_two() {
            entries.retain(|w| w.strong_count() > 0);
        }
        entries.push(Arc::downgrade(value));
    }

    /// Upgrade every still-alive entry
    pub fn live(&self) -> Vec<Arc<T>> {
        self.entries.lock().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Drop dead entries; returns how many were removed
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|w| w.strong_count() > 0);
        before - entries.len()
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

impl<T> Default for WeakRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
