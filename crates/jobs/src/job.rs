use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{DomainError, DomainResult, JobId, TemplateId};

use crate::template::{JobTemplate, TemplateTask, check_name};

const MAX_EXTERNAL_ID_LEN: usize = 128;

/// Identifier assigned to a job by the external job system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalJobId(String);

impl ExternalJobId {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(DomainError::invalid_id("ExternalJobId: empty"));
        }
        if id.len() > MAX_EXTERNAL_ID_LEN {
            return Err(DomainError::invalid_id("ExternalJobId: too long"));
        }
        if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(DomainError::invalid_id(
                "ExternalJobId: contains whitespace or control characters",
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ExternalJobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExternalJobId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalJobId> for String {
    fn from(value: ExternalJobId) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
}

/// Validated input for a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub template_id: Option<TemplateId>,
}

impl NewJob {
    pub fn validate(&self) -> DomainResult<()> {
        check_name("job name", &self.name)?;
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if due < start {
                return Err(DomainError::validation("due_date is before start_date"));
            }
        }
        Ok(())
    }
}

/// Stored job root.
///
/// A job is either `pending` with no external id, or `synced` holding one;
/// the two fields only change together through [`JobRecord::mark_synced`].
/// Decoding a stored record checks the same pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredJobRecord")]
pub struct JobRecord {
    pub job_id: JobId,
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
    sync_state: SyncState,
    external_id: Option<ExternalJobId>,
    /// Set while one caller owns the WFM create call for this job.
    sync_claimed_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub sync_attempts: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape of [`JobRecord`] before its sync fields are checked.
#[derive(Deserialize)]
struct StoredJobRecord {
    job_id: JobId,
    name: String,
    description: Option<String>,
    client_id: Option<String>,
    category: Option<String>,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    template_id: Option<TemplateId>,
    #[serde(default)]
    tasks: Vec<TemplateTask>,
    sync_state: SyncState,
    external_id: Option<ExternalJobId>,
    #[serde(default)]
    sync_claimed_at: Option<DateTime<Utc>>,
    last_sync_error: Option<String>,
    sync_attempts: u32,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredJobRecord> for JobRecord {
    type Error = DomainError;

    fn try_from(raw: StoredJobRecord) -> Result<Self, Self::Error> {
        match (raw.sync_state, &raw.external_id) {
            (SyncState::Synced, None) => {
                return Err(DomainError::invariant(format!("job {} is synced without an external id", raw.job_id)));
            }
            (SyncState::Pending, Some(id)) => {
                return Err(DomainError::invariant(format!(
                    "job {} is pending but holds external id {id}",
                    raw.job_id
                )));
            }
            _ => {}
        }
        Ok(Self {
            job_id: raw.job_id,
            name: raw.name,
            description: raw.description,
            client_id: raw.client_id,
            category: raw.category,
            start_date: raw.start_date,
            due_date: raw.due_date,
            template_id: raw.template_id,
            tasks: raw.tasks,
            sync_state: raw.sync_state,
            external_id: raw.external_id,
            sync_claimed_at: raw.sync_claimed_at,
            last_sync_error: raw.last_sync_error,
            sync_attempts: raw.sync_attempts,
            created_by: raw.created_by,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

impl JobRecord {
    pub fn create(
        job_id: JobId,
        input: NewJob,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        input.validate()?;
        Ok(Self {
            job_id,
            name: input.name.trim().to_string(),
            description: input.description,
            client_id: input.client_id,
            category: input.category,
            start_date: input.start_date,
            due_date: input.due_date,
            template_id: input.template_id,
            tasks: Vec::new(),
            sync_state: SyncState::Pending,
            external_id: None,
            sync_claimed_at: None,
            last_sync_error: None,
            sync_attempts: 0,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Copy the template's tasks onto this job.
    pub fn apply_template(&mut self, template: &JobTemplate) -> DomainResult<()> {
        if self.template_id != Some(template.id()) {
            return Err(DomainError::invariant("template_id mismatch"));
        }
        self.tasks = template.tasks.clone();
        Ok(())
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn external_id(&self) -> Option<&ExternalJobId> {
        self.external_id.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    /// Take ownership of the next WFM create call. Others leave the job
    /// alone until the claim is released or `lease` has passed.
    pub fn claim_sync(&mut self, now: DateTime<Utc>) {
        self.sync_claimed_at = Some(now);
        self.updated_at = now;
    }

    pub fn sync_claimed_at(&self) -> Option<DateTime<Utc>> {
        self.sync_claimed_at
    }

    pub fn has_live_claim(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        self.sync_claimed_at.is_some_and(|at| at + lease > now)
    }

    pub fn mark_synced(&mut self, external_id: ExternalJobId, now: DateTime<Utc>) {
        self.sync_state = SyncState::Synced;
        self.external_id = Some(external_id);
        self.sync_claimed_at = None;
        self.last_sync_error = None;
        self.sync_attempts += 1;
        self.updated_at = now;
    }

    /// Record a failed attempt. Synced jobs are left untouched.
    pub fn mark_sync_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        if self.sync_state == SyncState::Synced {
            return;
        }
        self.sync_claimed_at = None;
        self.last_sync_error = Some(error.into());
        self.sync_attempts += 1;
        self.updated_at = now;
    }

    /// Value sent as the external job's client reference so a retry can find
    /// a job that was created remotely but never acknowledged locally.
    pub fn client_reference(&self) -> String {
        self.job_id.to_string()
    }
}
