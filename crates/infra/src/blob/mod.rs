//! Object storage for uploaded files, plus creation notifications.
//!
//! Backends only store bytes. [`NotifyingBlobStore`] wraps any backend and
//! publishes exactly one [`ObjectCreated`] per successful `put_object`.

pub mod fs;
pub mod memory;
pub mod signing;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use stockyard_events::{Event, EventBus, InMemoryEventBus, ObjectCreated, Subscription};

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use signing::{PresignedUrl, SignatureError, UrlSigner};

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_FILE_NAME_LEN: usize = 128;
const UPLOAD_PREFIX: &str = "uploads";

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Opaque version token (SHA-256 of the content for the bundled backends).
    pub version: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("invalid bucket: {0}")]
    InvalidBucket(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("blob storage unavailable: {0}")]
    Unavailable(String),

    #[error("notification failed: {0}")]
    Notify(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectMeta, BlobError>;

    /// `None` when the object does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BlobError>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, BlobError>;
}

#[async_trait]
impl<S> BlobStore for Arc<S>
where
    S: BlobStore + ?Sized,
{
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectMeta, BlobError> {
        (**self).put_object(bucket, key, data).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BlobError> {
        (**self).get_object(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, BlobError> {
        (**self).head_object(bucket, key).await
    }
}

/// Blob store decorator that raises one creation notification per stored object.
///
/// Publishing happens only after the backend write succeeded.
pub struct NotifyingBlobStore<S> {
    inner: S,
    bus: Arc<InMemoryEventBus<ObjectCreated>>,
}

impl<S> NotifyingBlobStore<S> {
    pub fn new(inner: S, bus: Arc<InMemoryEventBus<ObjectCreated>>) -> Self {
        Self { inner, bus }
    }

    pub fn subscribe(&self) -> Subscription<ObjectCreated> {
        self.bus.subscribe()
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for NotifyingBlobStore<S> {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectMeta, BlobError> {
        let meta = self.inner.put_object(bucket, key, data).await?;

        let event = ObjectCreated::new(&meta.bucket, &meta.key, meta.size, &meta.version);
        let label = event.label();
        if let Err(e) = self.bus.publish(event) {
            warn!(bucket, key, error = ?e, "object stored but notification failed");
            return Err(BlobError::Notify(format!("{e:?}")));
        }
        debug!(bucket, key, size = meta.size, event = %label, "object created");
        Ok(meta)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BlobError> {
        self.inner.get_object(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, BlobError> {
        self.inner.head_object(bucket, key).await
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn content_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Bucket names: 3-63 characters of `[a-z0-9.-]`, starting and ending alphanumeric.
pub fn validate_bucket(bucket: &str) -> Result<(), BlobError> {
    let ok_len = (3..=63).contains(&bucket.len());
    let ok_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let ok_ends = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric());

    if ok_len && ok_chars && ok_ends {
        Ok(())
    } else {
        Err(BlobError::InvalidBucket(bucket.to_string()))
    }
}

/// Object keys are relative `/`-separated paths without empty, `.` or `..`
/// segments, `#`, backslashes or control characters.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let invalid = |why: &str| Err(BlobError::InvalidKey(format!("{key:?}: {why}")));

    if key.is_empty() {
        return invalid("empty");
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return invalid("too long");
    }
    if key.chars().any(|c| c.is_control() || c == '#' || c == '\\') {
        return invalid("reserved character");
    }
    if key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return invalid("empty or relative path segment");
    }
    Ok(())
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`, at most 128 characters.
pub fn sanitize_file_name(name: &str) -> String {
    // Only the last path component is meaningful.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Fresh object key for a direct client upload: `uploads/<uuid_v7>/<sanitized name>`.
pub fn upload_object_key(file_name: &str) -> String {
    format!(
        "{UPLOAD_PREFIX}/{}/{}",
        uuid::Uuid::now_v7(),
        sanitize_file_name(file_name)
    )
}
