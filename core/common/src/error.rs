//! Common error types for Shelfmark.

use thiserror::Error;

/// Top-level error type for Shelfmark operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote sync gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Cover download or cover URL resolution failed.
    #[error("Cover error: {0}")]
    Cover(String),

    /// Durable library persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Network operation failed.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
