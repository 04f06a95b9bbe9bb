use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{Instrument, debug, info, info_span, warn};

use stockyard_events::ObjectCreated;

use super::status::{FileState, FileStatus, FileStatusStore};
use super::{FileFormat, IngestError, ObjectCreatedConsumer, ParsedFile, ProcessingResult};
use crate::blob::{BlobError, BlobStore, content_sha256};
use crate::retry::RetryPolicy;
use crate::store::{KeyedStore, StoreError};

/// Time one invocation may take before the file is marked failed.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(300);

/// Fetch → de-duplicate → parse → write → report, for one bucket.
pub struct IngestPipeline<F> {
    bucket: String,
    format: F,
    blobs: Arc<dyn BlobStore>,
    statuses: FileStatusStore,
    retry: RetryPolicy,
    budget: Duration,
}

impl<F: FileFormat> IngestPipeline<F> {
    pub fn new(
        bucket: impl Into<String>,
        format: F,
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn KeyedStore>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            format,
            blobs,
            statuses: FileStatusStore::new(store),
            retry: RetryPolicy::default(),
            budget: DEFAULT_BUDGET,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    async fn process(&self, event: &ObjectCreated) -> Result<ProcessingResult, IngestError> {
        let (bucket, key) = (event.bucket.as_str(), event.key.as_str());
        let blobs = &self.blobs;
        let statuses = &self.statuses;

        let data = self
            .retry
            .run(
                "fetch object",
                |e: &BlobError| matches!(e, BlobError::Unavailable(_)),
                move || async move { blobs.get_object(bucket, key).await },
            )
            .await?;
        let Some(data) = data else {
            warn!("object no longer exists, discarding notification");
            return Ok(ProcessingResult::Discarded {
                reason: format!("object {bucket}/{key} not found"),
            });
        };
        let digest = content_sha256(&data);

        let existing = self
            .retry
            .run("load file status", StoreError::is_transient, move || async move {
                statuses.get(bucket, key).await
            })
            .await?;
        if let Some(done) = existing.filter(|s| s.is_completed_for(&digest)) {
            info!(sha256 = %digest, "content already processed, skipping duplicate delivery");
            return Ok(ProcessingResult::Duplicate(done.summary()));
        }

        let status = FileStatus::processing(
            self.format.name(),
            bucket,
            key,
            Some(digest),
            data.len() as u64,
            Utc::now(),
        );
        self.put_status(&status).await?;

        let ParsedFile { rows, mut errors } = self.format.parse(&data);
        debug!(rows = rows.len(), rejected = errors.len(), "parsed file");

        let tally = self.format.write(event, rows, &self.retry).await?;
        errors.extend(tally.errors);

        let completed = status.complete(tally.success, errors, Utc::now());
        self.put_status(&completed).await?;
        info!(success = completed.success, failed = completed.failed, "file processed");

        Ok(ProcessingResult::Completed(completed.summary()))
    }

    async fn put_status(&self, status: &FileStatus) -> Result<(), StoreError> {
        let statuses = &self.statuses;
        self.retry
            .run("write file status", StoreError::is_transient, move || async move {
                statuses.put(status).await
            })
            .await
    }

    /// Best effort: the failure being reported may be the store itself.
    async fn mark_failed(&self, event: &ObjectCreated, error: &str) {
        let now = Utc::now();
        let base = match self.statuses.get(&event.bucket, &event.key).await {
            Ok(Some(s)) if s.status == FileState::Processing => s,
            _ => FileStatus::processing(self.format.name(), &event.bucket, &event.key, None, event.size, now),
        };
        if let Err(e) = self.statuses.put(&base.fail(error, now)).await {
            warn!(error = %e, "could not record file failure");
        }
    }
}

#[async_trait]
impl<F: FileFormat> ObjectCreatedConsumer for IngestPipeline<F> {
    fn name(&self) -> &'static str {
        self.format.name()
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn on_object_created(&self, event: &ObjectCreated) -> ProcessingResult {
        if event.bucket != self.bucket {
            return ProcessingResult::Discarded {
                reason: format!("{} is not wired to bucket {}", self.name(), event.bucket),
            };
        }

        let span = info_span!("ingest", pipeline = self.name(), bucket = %event.bucket, key = %event.key);
        async {
            let error = match tokio::time::timeout(self.budget, self.process(event)).await {
                Ok(Ok(result)) => return result,
                Ok(Err(e)) => e,
                Err(_) => IngestError::TimedOut(self.budget),
            };
            warn!(error = %error, "file processing failed");
            let message = error.to_string();
            self.mark_failed(event, &message).await;
            ProcessingResult::Failed { error: message }
        }
        .instrument(span)
        .await
    }
}
