//! External job-system (WorkflowMax) sync client.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

use stockyard_jobs::ExternalJobId;

pub use client::WfmClient;
pub use error::SyncError;
pub use types::{WfmJob, WfmJobRequest};

/// Job operations against the external system.
///
/// Handlers depend on this seam rather than on [`WfmClient`] directly.
#[async_trait]
pub trait JobSyncClient: Send + Sync {
    async fn create_job(&self, request: &WfmJobRequest) -> Result<ExternalJobId, SyncError>;

    async fn list_current_jobs(&self) -> Result<Vec<WfmJob>, SyncError>;
}
