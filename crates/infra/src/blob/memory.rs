use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{BlobError, BlobStore, ObjectMeta, content_sha256, validate_bucket, validate_key};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: String,
    last_modified: DateTime<Utc>,
}

/// In-memory blob store for tests/dev.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn meta(bucket: &str, key: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: obj.data.len() as u64,
            version: obj.version.clone(),
            last_modified: obj.last_modified,
        }
    }
}

fn poisoned() -> BlobError {
    BlobError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectMeta, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let obj = StoredObject {
            version: content_sha256(&data),
            data,
            last_modified: Utc::now(),
        };
        let meta = Self::meta(bucket, key, &obj);

        self.objects
            .write()
            .map_err(|_| poisoned())?
            .insert((bucket.to_string(), key.to_string()), obj);
        Ok(meta)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BlobError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, BlobError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| Self::meta(bucket, key, o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_and_head() {
        let store = MemoryBlobStore::new();
        let meta = store
            .put_object("template-uploads", "uploads/1/t.csv", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.version, content_sha256(b"hello"));

        let data = store.get_object("template-uploads", "uploads/1/t.csv").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"hello"[..]));
        let head = store.head_object("template-uploads", "uploads/1/t.csv").await.unwrap();
        assert_eq!(head, Some(meta));
    }

    #[tokio::test]
    async fn missing_objects_are_none() {
        let store = MemoryBlobStore::new();
        assert!(store.get_object("template-uploads", "nope").await.unwrap().is_none());
        assert!(store.head_object("template-uploads", "nope").await.unwrap().is_none());
    }
}
