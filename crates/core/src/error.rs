//! Core Error Types
//!
//! Errors raised by the shared building blocks: retry policies that fail
//! validation and prompt templates that fail to parse or render. The
//! application maps them into its own `AppError`.

use thiserror::Error;

/// Core error type for the askdb workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template errors (malformed template source, missing or unknown slots)
    #[error("Template error: {0}")]
    Template(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }
}
