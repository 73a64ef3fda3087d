//! Error types for cellar-core.

use thiserror::Error;

/// Result type for cellar-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellar-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A cell's identity could not be derived.
    #[error("fingerprint error: {0}")]
    Fingerprint(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A cache entry was written by an incompatible format version.
    #[error("cache entry version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// A session snapshot could not be restored into the kernel.
    #[error("session restore failed: {0}")]
    Restore(String),

    /// A session snapshot could not be taken at all.
    #[error("session capture failed: {0}")]
    Capture(String),

    /// The code of a cell failed while running live.
    #[error("cell {index} failed: {message}")]
    Execution { index: usize, message: String },

    /// Invalid or incomplete notebook parameters.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// Invalid operation (e.g., running a controller twice).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Whether the error ends a run, as opposed to degrading caching.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Fingerprint(_)
                | Error::Execution { .. }
                | Error::Parameter(_)
                | Error::InvalidOperation(_)
        )
    }
}
