/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use thiserror::Error;

// Re-export ResourceError from memory module
pub use crate::memory::ResourceError;

// Re-export ProgressError from progress module
pub use crate::progress::ProgressError;

/// Unified core error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    #[error("Progress error: {0}")]
    #[diagnostic(transparent)]
    Progress(#[from] ProgressError),

    #[error("Resource error: {0}")]
    #[diagnostic(transparent)]
    Resource(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(core::configuration_error),
        help("Invalid configuration. Review the SEO_* environment variables.")
    )]
    Configuration(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(core::io_error),
        help("Spawning a background thread or reading process statistics failed.")
    )]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl CoreError {
    /// Whether this error came from a memory limit action (`error` / `abort`)
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, CoreError::Resource(ResourceError::LimitExceeded { .. }))
    }
}
