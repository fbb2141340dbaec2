//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<askdb_core::CoreError> for AppError {
    fn from(err: askdb_core::CoreError) -> Self {
        match err {
            askdb_core::CoreError::Validation(msg) => Self::Validation(msg),
            askdb_core::CoreError::Template(msg) => Self::Internal(format!("template: {}", msg)),
        }
    }
}

impl From<askdb_llm::LlmError> for AppError {
    fn from(err: askdb_llm::LlmError) -> Self {
        Self::Llm(err.to_string())
    }
}

impl From<askdb_sql::BackendError> for AppError {
    fn from(err: askdb_sql::BackendError) -> Self {
        Self::Database(err.to_string())
    }
}
