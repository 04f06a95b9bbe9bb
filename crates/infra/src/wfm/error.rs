use thiserror::Error;

use crate::config::CredentialError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Authentication failed again after re-reading the token. Not retried.
    #[error("external auth expired: {0}")]
    AuthExpired(String),

    /// The external system refused the request (4xx other than auth/429).
    #[error("external system rejected request ({status}): {detail}")]
    ExternalRejected { status: u16, detail: String },

    /// 5xx or transport failures after the retry budget was spent.
    #[error("external system unavailable: {0}")]
    ExternalUnavailable(String),

    /// 429 responses after the retry budget was spent.
    #[error("external system rate limited: {0}")]
    RateLimited(String),

    #[error("external response invalid: {0}")]
    InvalidResponse(String),

    #[error("sync not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl SyncError {
    /// Short machine-readable kind, recorded on job history.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::AuthExpired(_) => "auth_expired",
            SyncError::ExternalRejected { .. } => "external_rejected",
            SyncError::ExternalUnavailable(_) => "external_unavailable",
            SyncError::RateLimited(_) => "rate_limited",
            SyncError::InvalidResponse(_) => "invalid_response",
            SyncError::NotConfigured(_) => "not_configured",
            SyncError::Credential(_) => "credential",
        }
    }
}
