/*!
 * RAII Scope Guards
 *
 * Scoped measurement guards with automatic finalization.
 *
 * ## Guard Types
 *
 * - **ProfileScope**: memory/time/allocation measurement of a block
 *   (`memory::profiler`)
 * - **OperationGuard**: usage summary of a monitored operation
 *   (`memory::optimizer`)
 *
 * Both finalize on drop, including during unwinding, so a measured block
 * always produces its result even when it exits early.
 *
 * ## Example
 *
 * ```ignore
 * let scope = profiler.profile_block("parse_sitemap");
 * // work...
 * let result = scope.finish();
 * ```
 */

mod traits;

pub use traits::{Guard, GuardDrop};

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors that can occur during guard operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuardError {
    #[error("Resource already released")]
    AlreadyReleased,
}

/// Guard metadata for observability
#[derive(Debug, Clone)]
pub struct GuardMetadata {
    pub resource_type: &'static str,
    pub name: String,
    pub creation_time: std::time::Instant,
}

impl GuardMetadata {
    #[inline]
    pub fn new(resource_type: &'static str, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            name: name.into(),
            creation_time: std::time::Instant::now(),
        }
    }
}
