use thiserror::Error;

use stockyard_core::DomainError;

use crate::blob::{BlobError, SignatureError};
use crate::config::CredentialError;
use crate::store::StoreError;
use crate::wfm::SyncError;

/// Handler-layer error. The API crate maps each variant to one HTTP status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invariant(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Worth another attempt with the same input.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Store(e) => e.is_transient(),
            ServiceError::Blob(BlobError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(m) | DomainError::InvalidId(m) => ServiceError::Validation(m),
            DomainError::InvariantViolation(m) => ServiceError::Invariant(m),
            DomainError::NotFound(m) => ServiceError::NotFound(m),
            DomainError::Conflict(m) => ServiceError::Conflict(m),
        }
    }
}

impl From<SignatureError> for ServiceError {
    fn from(value: SignatureError) -> Self {
        ServiceError::Forbidden(value.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
