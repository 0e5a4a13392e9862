/*!
 * Garbage Collection
 * Reclaimer registry driven by the monitor and optimizer
 */

pub mod collector;

pub use collector::{GarbageCollector, GcStats, ReclaimFn};
