//! Error types for the log adapter.

use thiserror::Error;

/// Errors that can occur during log adapter operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transient bus failure; safe to retry with backoff.
    #[error("Bus error: {0}")]
    Bus(String),

    /// An offset commit was rejected.
    #[error("Commit error: {0}")]
    Commit(String),

    /// I/O error (network, file, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for log adapter operations.
pub type Result<T> = std::result::Result<T, LogError>;

impl LogError {
    /// Whether the error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::Bus(_) | LogError::Io(_))
    }
}
