//! Error types for the accumulator.

use thiserror::Error;

/// Errors that can occur while processing records.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The state store failed; fatal to the worker owning the partition.
    #[error("State error: {0}")]
    State(#[from] behovsamler_state::StateError),

    /// The log adapter failed beyond its internal retries.
    #[error("Log error: {0}")]
    Log(#[from] behovsamler_log::LogError),

    /// An envelope operation failed on data we produced ourselves.
    #[error("Envelope error: {0}")]
    Envelope(#[from] behovsamler_core::EnvelopeError),

    /// A persisted state blob could not be decoded.
    #[error("State decode error: {0}")]
    StateDecode(String),

    /// Worker or runtime failure.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;
