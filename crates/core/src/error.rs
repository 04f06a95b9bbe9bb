//! Rule failures raised by the pure domain types.
//!
//! Nothing in here touches IO: storage, blob and sync failures have their own
//! error types in `stockyard-infra`.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input that can never be accepted, whatever the current state.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Input that is well formed but breaks a rule for the current state,
    /// such as consuming more stock than is on hand.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A SKU, job id or template id that does not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The record changed underneath the caller.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
