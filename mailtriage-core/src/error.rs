//! Error types for mailtriage-core

use thiserror::Error;

/// Main error type for the mailtriage-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing setting, absent or malformed schema file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Mail provider or completion provider call failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Delegated triage output did not conform to the classification schema
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(i64),
}

/// Result type alias for mailtriage-core
pub type Result<T> = std::result::Result<T, Error>;
