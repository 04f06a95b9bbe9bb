use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::TableKey;

use super::{FileSummary, ParseError};
use crate::store::{KeyedStore, Record, StoreError};

/// Row errors kept on the status record; `failed` still counts all of them.
pub const MAX_REPORTED_ERRORS: usize = 50;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Processing,
    Completed,
    Failed,
}

/// Per-object processing record, stored at `FILE#<bucket>/<key>` / `STATUS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub bucket: String,
    pub key: String,
    pub pipeline: String,
    pub status: FileState,
    /// Digest of the content this record describes; `None` if it was never fetched.
    pub content_sha256: Option<String>,
    pub size: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: u32,
    pub failed: u32,
    pub errors: Vec<ParseError>,
    pub error: Option<String>,
}

impl FileStatus {
    pub fn processing(
        pipeline: &str,
        bucket: &str,
        key: &str,
        content_sha256: Option<String>,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            pipeline: pipeline.to_string(),
            status: FileState::Processing,
            content_sha256,
            size,
            started_at: now,
            finished_at: None,
            success: 0,
            failed: 0,
            errors: Vec::new(),
            error: None,
        }
    }

    pub fn complete(mut self, success: u32, mut errors: Vec<ParseError>, now: DateTime<Utc>) -> Self {
        errors.sort_by_key(|e| e.row);
        self.status = FileState::Completed;
        self.success = success;
        self.failed = errors.len() as u32;
        errors.truncate(MAX_REPORTED_ERRORS);
        self.errors = errors;
        self.error = None;
        self.finished_at = Some(now);
        self
    }

    pub fn fail(mut self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.status = FileState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self
    }

    /// Already fully processed with exactly this content.
    pub fn is_completed_for(&self, content_sha256: &str) -> bool {
        self.status == FileState::Completed
            && self.content_sha256.as_deref() == Some(content_sha256)
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            success: self.success,
            failed: self.failed,
            errors: self.errors.clone(),
        }
    }
}

/// Reads and writes [`FileStatus`] records.
#[derive(Clone)]
pub struct FileStatusStore {
    store: Arc<dyn KeyedStore>,
}

impl FileStatusStore {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Result<Option<FileStatus>, StoreError> {
        let table_key = TableKey::file_status(bucket, key)?;
        match self.store.get(&table_key).await? {
            Some(rec) => rec.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Last-write-wins: only the pipeline owning the bucket writes these.
    pub async fn put(&self, status: &FileStatus) -> Result<(), StoreError> {
        let table_key = TableKey::file_status(&status.bucket, &status.key)?;
        self.store.put(Record::from_value(table_key, status)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKeyedStore;

    #[test]
    fn completion_counts_every_error_but_keeps_fifty() {
        let errors = (1..=60).rev().map(|r| ParseError::new(r, "bad")).collect();
        let status = FileStatus::processing("inventory", "b", "k", Some("abc".into()), 10, Utc::now())
            .complete(3, errors, Utc::now());

        assert_eq!(status.failed, 60);
        assert_eq!(status.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(status.errors[0].row, 1);
        assert!(status.is_completed_for("abc"));
        assert!(!status.is_completed_for("def"));
    }

    #[tokio::test]
    async fn round_trips_through_the_store() {
        let statuses = FileStatusStore::new(Arc::new(InMemoryKeyedStore::new()));
        let status = FileStatus::processing("templates", "template-uploads", "uploads/x/t.csv", None, 0, Utc::now())
            .fail("boom", Utc::now());
        statuses.put(&status).await.unwrap();

        let loaded = statuses.get("template-uploads", "uploads/x/t.csv").await.unwrap().unwrap();
        assert_eq!(loaded.status, FileState::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(statuses.get("template-uploads", "other.csv").await.unwrap().is_none());
    }
}
