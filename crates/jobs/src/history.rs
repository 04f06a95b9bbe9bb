use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{HistoryEntryId, JobId};

use crate::job::ExternalJobId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Synced,
    SyncFailed,
    /// Adopted an external job found by client reference.
    Reconciled,
}

/// Append-only audit entry for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHistoryEntry {
    pub entry_id: HistoryEntryId,
    pub job_id: JobId,
    pub action: HistoryAction,
    pub actor: String,
    pub detail: Option<String>,
    pub external_id: Option<ExternalJobId>,
    pub occurred_at: DateTime<Utc>,
}

impl JobHistoryEntry {
    pub fn new(job_id: JobId, action: HistoryAction, actor: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            entry_id: HistoryEntryId::new(),
            job_id,
            action,
            actor: actor.to_string(),
            detail: None,
            external_id: None,
            occurred_at,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_external_id(mut self, external_id: ExternalJobId) -> Self {
        self.external_id = Some(external_id);
        self
    }
}
