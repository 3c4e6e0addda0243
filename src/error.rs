//! Reader error types.

use thiserror::Error;

/// Errors raised while loading label tables or constructing minibatches
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Invalid or inconsistent configuration, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input data, fatal at detection
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Internal invariant violation
    #[error("logic error: {0}")]
    Logic(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;
