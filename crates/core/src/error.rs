//! Domain error model.
//!
//! Deterministic, business-level failures only (validation, bad identifiers).
//! Infrastructure concerns (Redis, HTTP) have their own error types in the
//! layers that own them.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error (business logic failures).
///
/// Errors are `Clone` and `PartialEq` so tests can compare them directly and
/// callers can carry them across thread boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, enum violation).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. empty deal id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
