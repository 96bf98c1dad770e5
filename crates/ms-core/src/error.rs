//! Error types for ms-core

use thiserror::Error;

/// Main error type for ms-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required input missing or empty. Raised before the store is touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No current (non-archived) record exists for the memory id.
    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ms-core
pub type Result<T> = std::result::Result<T, Error>;
