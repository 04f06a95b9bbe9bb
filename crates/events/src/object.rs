use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Notification raised once per object stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Opaque version token of the stored object.
    pub version: String,
    pub occurred_at: DateTime<Utc>,
}

impl ObjectCreated {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: u64,
        version: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            version: version.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl Event for ObjectCreated {
    fn event_type(&self) -> &'static str {
        "blob.object.created"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_bucket_key_and_size() {
        let ev = ObjectCreated::new("uploads", "uploads/1/stock.csv", 42, "v1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["bucket"], "uploads");
        assert_eq!(json["key"], "uploads/1/stock.csv");
        assert_eq!(json["size"], 42);
        assert_eq!(ev.label(), "blob.object.created@v1");
    }
}
