//! Error types for fetchtap

use std::io;
use thiserror::Error;

/// Result type for fetchtap operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Errors raised by the recorder's own machinery
///
/// Failures of the wrapped network call are never converted into this type;
/// they reach the caller as the entry point's own [`crate::network::FetchError`].
#[derive(Debug, Error)]
pub enum TapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Rejected mode, filter or configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Captures could not be turned into exportable text
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sink refused or failed to store a payload
    #[error("Sink rejected '{name}': {reason}")]
    Sink {
        /// Suggested name of the payload
        name: String,
        /// Why the sink failed
        reason: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
