use std::sync::Arc;

use tracing::instrument;

use stockyard_core::key::{prefix, sort};
use stockyard_core::{JobId, PartitionKey, TableKey};
use stockyard_jobs::{JobHistoryEntry, JobRecord};

use super::Stored;
use crate::services::{ServiceError, ServiceResult};
use crate::store::{Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome, WriteOutcome};

/// Job roots and their history entries (one partition per job).
///
/// Every state change of a job is written together with the history entry
/// describing it, so history never claims a transition the root lacks.
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn KeyedStore>,
}

impl JobRepository {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, job_id: JobId) -> Result<Option<Stored<JobRecord>>, StoreError> {
        match self.store.get(&TableKey::job(job_id)).await? {
            Some(rec) => Ok(Some(Stored {
                value: rec.decode()?,
                version: rec.version,
            })),
            None => Ok(None),
        }
    }

    /// Insert a new job with its first history entry. Returns the root version.
    #[instrument(skip(self, job, entry), fields(job_id = %job.job_id))]
    pub async fn insert(&self, job: &JobRecord, entry: &JobHistoryEntry) -> ServiceResult<u64> {
        self.write(job, Condition::NotExists, entry).await
    }

    /// Write back a job loaded at `version`, appending `entry`. Returns the new version.
    #[instrument(skip(self, job, entry), fields(job_id = %job.job_id))]
    pub async fn update(
        &self,
        job: &JobRecord,
        version: u64,
        entry: &JobHistoryEntry,
    ) -> ServiceResult<u64> {
        self.write(job, Condition::VersionEquals(version), entry).await
    }

    /// Persist a sync claim on a job loaded at `version`. Losing the race
    /// is a [`ServiceError::Conflict`]: another caller owns the WFM call.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn claim(&self, job: &JobRecord, version: u64) -> ServiceResult<u64> {
        let record = Record::from_value(TableKey::job(job.job_id), job)?;
        match self.store.put_if(record, Condition::VersionEquals(version)).await? {
            WriteOutcome::Written { version } => Ok(version),
            WriteOutcome::ConditionFailed { .. } => Err(ServiceError::Conflict(format!(
                "job {} was claimed concurrently",
                job.job_id
            ))),
        }
    }

    async fn write(
        &self,
        job: &JobRecord,
        condition: Condition,
        entry: &JobHistoryEntry,
    ) -> ServiceResult<u64> {
        let ops = vec![
            ConditionalPut::new(Record::from_value(TableKey::job(job.job_id), job)?, condition),
            ConditionalPut::new(
                Record::from_value(TableKey::job_history(job.job_id, entry.entry_id), entry)?,
                Condition::NotExists,
            ),
        ];

        match self.store.transact(ops).await? {
            TransactOutcome::Committed { versions } => Ok(versions.first().copied().unwrap_or(1)),
            TransactOutcome::ConditionFailed { .. } => Err(ServiceError::Conflict(format!(
                "job {} was modified concurrently",
                job.job_id
            ))),
        }
    }

    /// Jobs still waiting for an external id.
    pub async fn pending(&self) -> Result<Vec<Stored<JobRecord>>, StoreError> {
        let mut out = Vec::new();
        for rec in self.store.scan(prefix::JOB, Some(sort::ROOT)).await? {
            let job: JobRecord = rec.decode()?;
            if job.is_pending() {
                out.push(Stored {
                    value: job,
                    version: rec.version,
                });
            }
        }
        Ok(out)
    }

    /// History of one job, oldest first.
    pub async fn history(&self, job_id: JobId) -> Result<Vec<JobHistoryEntry>, StoreError> {
        let mut entries = self
            .store
            .query(&PartitionKey::job(job_id), Some(sort::HISTORY))
            .await?
            .iter()
            .map(Record::decode::<JobHistoryEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| (a.occurred_at, a.entry_id).cmp(&(b.occurred_at, b.entry_id)));
        Ok(entries)
    }

    /// History across all jobs, newest first, at most `limit` entries.
    pub async fn all_history(&self, limit: usize) -> Result<Vec<JobHistoryEntry>, StoreError> {
        let mut entries = self
            .store
            .scan(prefix::JOB, Some(sort::HISTORY))
            .await?
            .iter()
            .map(Record::decode::<JobHistoryEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| (b.occurred_at, b.entry_id).cmp(&(a.occurred_at, a.entry_id)));
        entries.truncate(limit);
        Ok(entries)
    }
}
