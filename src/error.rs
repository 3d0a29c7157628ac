//! SoulSketch error types

use thiserror::Error;

/// SoulSketch error type
///
/// "Not found" is deliberately absent: lookups return `Option`/`bool` so the
/// caller can tell an absent packet apart from a broken store.
#[derive(Error, Debug)]
pub enum Error {
    /// Document structure could not be decoded (missing delimiters, bad typed field)
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Write-time invariant violation; nothing was written
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sync target error
    #[error("Sync error: {0}")]
    Sync(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for SoulSketch operations
pub type Result<T> = std::result::Result<T, Error>;
