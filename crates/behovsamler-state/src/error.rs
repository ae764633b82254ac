//! Error types for the state store.

use thiserror::Error;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The local store rejected a read or write.
    #[error("Store error: {0}")]
    Store(String),

    /// The changelog could not be written or replayed.
    #[error("Changelog error: {0}")]
    Changelog(String),

    /// Encoding or decoding a changelog entry failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;
