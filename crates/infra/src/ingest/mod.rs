//! Event-triggered file ingestion.
//!
//! A blob creation notification is routed by bucket to exactly one
//! [`ObjectCreatedConsumer`]. Both bundled consumers are an
//! [`IngestPipeline`] with a different [`FileFormat`]:
//!
//! 1. fetch the object (missing → `Discarded`)
//! 2. compare its SHA-256 with the file status record (same → `Duplicate`)
//! 3. mark the status `processing`
//! 4. parse CSV rows; bad rows become [`ParseError`]s, the file goes on
//! 5. write rows under deterministic keys, retrying transient store errors
//! 6. mark the status `completed` with the per-row tally
//!
//! Retry exhaustion and running out of the time budget mark the file `failed`.

pub mod inventory;
pub mod pipeline;
pub mod registry;
pub mod status;
pub mod template;

mod table;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockyard_events::ObjectCreated;

use crate::blob::BlobError;
use crate::config::CredentialError;
use crate::retry::RetryPolicy;
use crate::services::ServiceError;
use crate::store::StoreError;

pub use inventory::{InventoryFormat, InventoryRow};
pub use pipeline::{DEFAULT_BUDGET, IngestPipeline};
pub use registry::{ConsumerRegistry, WiringError};
pub use status::{FileState, FileStatus, FileStatusStore, MAX_REPORTED_ERRORS};
pub use template::{TemplateFormat, TemplateRow};

/// One rejected row. `row` counts data rows from 1; `0` means the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub row: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(row: u32, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// Per-file outcome counts as reported to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub success: u32,
    pub failed: u32,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Completed(FileSummary),
    /// Same content was already processed; nothing was written.
    Duplicate(FileSummary),
    /// Nothing to do (object gone, or not this consumer's bucket).
    Discarded { reason: String },
    Failed { error: String },
}

/// Errors that abort a whole file. Row-level problems are [`ParseError`]s.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("keyed store: {0}")]
    Store(#[from] StoreError),

    #[error("configuration: {0}")]
    Config(#[from] CredentialError),

    #[error("time budget of {0:?} exceeded")]
    TimedOut(Duration),
}

/// Consumer of blob creation notifications.
#[async_trait]
pub trait ObjectCreatedConsumer: Send + Sync {
    fn name(&self) -> &'static str;

    /// The one bucket this consumer is wired to.
    fn bucket(&self) -> &str;

    /// Must be idempotent: delivery is at-least-once.
    async fn on_object_created(&self, event: &ObjectCreated) -> ProcessingResult;
}

/// A parsed data row and its 1-based position in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow<R> {
    pub row: u32,
    pub value: R,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile<R> {
    pub rows: Vec<ParsedRow<R>>,
    pub errors: Vec<ParseError>,
}

/// Outcome of writing the parsed rows of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowTally {
    pub success: u32,
    pub errors: Vec<ParseError>,
}

/// File-specific half of an ingestion pipeline.
#[async_trait]
pub trait FileFormat: Send + Sync + 'static {
    type Row: Send + Sync;

    fn name(&self) -> &'static str;

    fn parse(&self, data: &[u8]) -> ParsedFile<Self::Row>;

    /// Persist rows. Rows that are rejected go into the tally; an `Err`
    /// aborts the file.
    async fn write(
        &self,
        source: &ObjectCreated,
        rows: Vec<ParsedRow<Self::Row>>,
        retry: &RetryPolicy,
    ) -> Result<RowTally, IngestError>;
}

/// Split a failed row write into "reject this row" and "abort the file".
pub(crate) fn row_failure(err: ServiceError) -> Result<String, IngestError> {
    match err {
        ServiceError::Store(e) => Err(IngestError::Store(e)),
        ServiceError::Blob(e) => Err(IngestError::Blob(e)),
        ServiceError::Credential(e) => Err(IngestError::Config(e)),
        other => Ok(other.to_string()),
    }
}
