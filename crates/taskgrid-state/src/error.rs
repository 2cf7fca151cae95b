//! Error types for the TaskGrid domain model.

use thiserror::Error;

/// Result type alias for domain model operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised while interpreting domain records.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid memory quantity: {0}")]
    InvalidMemory(String),

    #[error("invalid {field} request: {value}")]
    InvalidResource { field: &'static str, value: f64 },
}
