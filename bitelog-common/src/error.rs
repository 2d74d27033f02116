//! Common error types for bitelog

use thiserror::Error;

/// Common result type for bitelog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across the bitelog crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
