//! Error types for didlab

use thiserror::Error;

/// didlab error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error (singular design, non-finite statistics, ...)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Malformed or inconsistent input data
    #[error("Data error: {0}")]
    Data(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
