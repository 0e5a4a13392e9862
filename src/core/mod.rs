/*!
 * Core Module
 * Shared types, clocks, limits, guards, and error handling
 */

pub mod clock;
pub mod errors;
pub mod guard;
pub mod limits;
pub mod serde;
pub mod types;

// Re-export for convenience
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use errors::*;
pub use guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
pub use types::*;
