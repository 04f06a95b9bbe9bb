use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::instrument;

use super::{BlobError, BlobStore, ObjectMeta, content_sha256, validate_bucket, validate_key};

/// Filesystem blob store: objects live at `<root>/<bucket>/<key>`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a partially written object.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let mut path = self.root.join(bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }
}

fn io_error(op: &str, path: &Path, e: std::io::Error) -> BlobError {
    BlobError::Unavailable(format!("{op} {}: {e}", path.display()))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectMeta, BlobError> {
        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create_dir_all", parent, e))?;
        }

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::now_v7().simple()));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))?;

        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            version: content_sha256(&data),
            last_modified: Utc::now(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BlobError> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, BlobError> {
        let path = self.path_for(bucket, key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            version: content_sha256(&data),
            last_modified: modified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn objects_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let meta = store
            .put_object("inventory-uploads", "uploads/abc/stock.csv", Bytes::from_static(b"sku\n"))
            .await
            .unwrap();
        assert!(dir.path().join("inventory-uploads/uploads/abc/stock.csv").exists());

        let head = store
            .head_object("inventory-uploads", "uploads/abc/stock.csv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.version, meta.version);
        assert_eq!(head.size, 4);

        let data = store.get_object("inventory-uploads", "uploads/abc/stock.csv").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"sku\n"[..]));
    }

    #[tokio::test]
    async fn missing_and_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.get_object("inventory-uploads", "nope.csv").await.unwrap().is_none());
        assert!(matches!(
            store.get_object("inventory-uploads", "../escape").await,
            Err(BlobError::InvalidKey(_))
        ));
    }
}
