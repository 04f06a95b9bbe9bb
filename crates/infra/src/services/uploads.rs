use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{info, instrument};

use super::{ServiceError, ServiceResult};
use crate::blob::{BlobStore, ObjectMeta, PresignedUrl, UrlSigner, upload_object_key, validate_key};
use crate::ingest::{FileStatus, FileStatusStore};

/// Which pipeline an upload is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Inventory,
    Template,
}

/// Pre-signed upload URLs and the endpoint that honours them.
#[derive(Clone)]
pub struct UploadService {
    signer: UrlSigner,
    blobs: Arc<dyn BlobStore>,
    upload_bucket: String,
    template_bucket: String,
    ttl: Duration,
}

impl UploadService {
    pub fn new(
        signer: UrlSigner,
        blobs: Arc<dyn BlobStore>,
        upload_bucket: impl Into<String>,
        template_bucket: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            signer,
            blobs,
            upload_bucket: upload_bucket.into(),
            template_bucket: template_bucket.into(),
            ttl,
        }
    }

    pub fn bucket_for(&self, target: UploadTarget) -> &str {
        match target {
            UploadTarget::Inventory => &self.upload_bucket,
            UploadTarget::Template => &self.template_bucket,
        }
    }

    /// A fresh object key under the target bucket, writable until the URL expires.
    pub fn presign(&self, target: UploadTarget, file_name: &str) -> ServiceResult<PresignedUrl> {
        if file_name.trim().is_empty() {
            return Err(ServiceError::validation("file_name is required"));
        }
        let key = upload_object_key(file_name);
        let url = self
            .signer
            .presign_put(self.bucket_for(target), &key, self.ttl, Utc::now())?;
        info!(bucket = %url.bucket, key = %url.key, "issued upload url");
        Ok(url)
    }

    /// Store the body of a pre-signed `PUT`. Only the two upload buckets are writable.
    #[instrument(skip(self, signature, body), fields(size = body.len()))]
    pub async fn accept_upload(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        body: Bytes,
    ) -> ServiceResult<ObjectMeta> {
        self.signer.verify(bucket, key, expires, signature, Utc::now())?;
        if bucket != self.upload_bucket && bucket != self.template_bucket {
            return Err(ServiceError::Forbidden(format!("bucket {bucket} is not writable")));
        }
        Ok(self.blobs.put_object(bucket, key, body).await?)
    }
}

/// Read access to the per-file processing records.
#[derive(Clone)]
pub struct FileStatusService {
    statuses: FileStatusStore,
}

impl FileStatusService {
    pub fn new(statuses: FileStatusStore) -> Self {
        Self { statuses }
    }

    pub async fn get(&self, bucket: &str, key: &str) -> ServiceResult<FileStatus> {
        if bucket.trim().is_empty() {
            return Err(ServiceError::validation("bucket is required"));
        }
        validate_key(key).map_err(|e| ServiceError::validation(e.to_string()))?;
        self.statuses
            .get(bucket, key)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("no status for {bucket}/{key}")))
    }
}
