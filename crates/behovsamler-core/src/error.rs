//! Error types for envelope handling.

use thiserror::Error;

/// Errors that can occur when parsing or serialising record envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The payload is not a JSON object.
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Serialisation back to bytes failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;

impl From<serde_json::Error> for EnvelopeError {
    fn from(e: serde_json::Error) -> Self {
        EnvelopeError::Malformed(e.to_string())
    }
}
