/*!
 * Guard Traits
 * Finalize-once contract shared by measurement scopes
 */

use super::{GuardMetadata, GuardResult};

/// Scope that measures between creation and finalization
///
/// `release` finalizes the measurement early; the result is recorded
/// exactly once whether the scope is released or dropped.
pub trait Guard: Send {
    /// Kind of measurement, e.g. `profile` or `operation`
    fn resource_type(&self) -> &'static str;

    fn metadata(&self) -> &GuardMetadata;

    /// True until the measurement has been recorded
    fn is_active(&self) -> bool;

    /// Record the measurement now; fails with `AlreadyReleased` on a second call
    fn release(&mut self) -> GuardResult<()>;
}

/// Drop hook for guards
///
/// Implementors call `on_drop` from `Drop`. The default records a scope that
/// is still open and ignores one that was already released.
pub trait GuardDrop: Guard {
    fn on_drop(&mut self) {
        if self.is_active() {
            let _ = self.release();
        }
    }
}
