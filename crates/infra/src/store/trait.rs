use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use stockyard_core::{ExpectedVersion, KeyError, PartitionKey, TableKey};

/// One stored record: its key, a free-form attribute map and the store-managed version.
///
/// `version` is `0` for a record that has not been written yet. Stores assign
/// `1` on create and bump it on every subsequent write.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: TableKey,
    pub attributes: Map<String, JsonValue>,
    pub version: u64,
}

impl Record {
    pub fn new(key: TableKey, attributes: Map<String, JsonValue>) -> Self {
        Self {
            key,
            attributes,
            version: 0,
        }
    }

    /// Build a record from any value that serializes to a JSON object.
    pub fn from_value<T: Serialize>(key: TableKey, value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value) {
            Ok(JsonValue::Object(map)) => Ok(Self::new(key, map)),
            Ok(other) => Err(StoreError::Serialization(format!(
                "record {key} must serialize to an object, got {other}"
            ))),
            Err(e) => Err(StoreError::Serialization(format!(
                "record {key} serialization failed: {e}"
            ))),
        }
    }

    /// Decode the attribute map into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(JsonValue::Object(self.attributes.clone())).map_err(|e| {
            StoreError::Serialization(format!("record {} decode failed: {e}", self.key))
        })
    }
}

/// Precondition of a conditional write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Unconditional (last-write-wins).
    Always,
    /// The key must not hold a record yet.
    NotExists,
    /// The stored record must be at exactly this version.
    VersionEquals(u64),
}

impl Condition {
    /// `current` is `None` when no record exists at the key.
    pub fn holds(self, current: Option<u64>) -> bool {
        match self {
            Condition::Always => true,
            Condition::NotExists => current.is_none(),
            Condition::VersionEquals(v) => current == Some(v),
        }
    }
}

impl From<ExpectedVersion> for Condition {
    fn from(value: ExpectedVersion) -> Self {
        match value {
            ExpectedVersion::Any => Condition::Always,
            ExpectedVersion::Absent => Condition::NotExists,
            ExpectedVersion::Exact(v) => Condition::VersionEquals(v),
        }
    }
}

/// Result of a conditional write. A failed condition is an outcome, not an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { version: u64 },
    ConditionFailed { current_version: Option<u64> },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// One element of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalPut {
    pub record: Record,
    pub condition: Condition,
}

impl ConditionalPut {
    pub fn new(record: Record, condition: Condition) -> Self {
        Self { record, condition }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactOutcome {
    /// Every put was applied; versions are in batch order.
    Committed { versions: Vec<u64> },
    /// Nothing was applied; `index` names the first put whose condition failed.
    ConditionFailed {
        index: usize,
        current_version: Option<u64>,
    },
}

/// Keyed store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Transient backend failure (connection, timeout, contention). Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A key was malformed or a batch spanned partitions. Never retried.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Attributes could not be encoded or decoded. Permanent.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<KeyError> for StoreError {
    fn from(value: KeyError) -> Self {
        StoreError::InvalidKey(value.to_string())
    }
}

/// Single-table keyed store.
///
/// ## Semantics
///
/// - `(partition, sort)` identifies exactly one record.
/// - Single-record writes are atomic; `put` is last-write-wins.
/// - `query` returns one partition ascending by sort key.
/// - `transact` is all-or-nothing and restricted to one partition; a batch
///   spanning partitions fails with [`StoreError::InvalidKey`] before any write.
/// - `scan` is a full-table listing filtered by partition prefix and,
///   optionally, a sort-key prefix. Ordered by `(partition, sort)`.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Unconditional write. Returns the new version.
    async fn put(&self, record: Record) -> Result<u64, StoreError> {
        match self.put_if(record, Condition::Always).await? {
            WriteOutcome::Written { version } => Ok(version),
            WriteOutcome::ConditionFailed { .. } => Err(StoreError::Unavailable(
                "unconditional write reported a failed condition".to_string(),
            )),
        }
    }

    async fn put_if(&self, record: Record, condition: Condition)
    -> Result<WriteOutcome, StoreError>;

    async fn get(&self, key: &TableKey) -> Result<Option<Record>, StoreError>;

    async fn query(
        &self,
        partition: &PartitionKey,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError>;

    async fn transact(&self, ops: Vec<ConditionalPut>) -> Result<TransactOutcome, StoreError>;

    async fn scan(
        &self,
        partition_prefix: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Reject batches that touch more than one partition.
pub(crate) fn single_partition(ops: &[ConditionalPut]) -> Result<Option<&PartitionKey>, StoreError> {
    let Some(first) = ops.first() else {
        return Ok(None);
    };
    let partition = &first.record.key.partition;
    if let Some((idx, op)) = ops
        .iter()
        .enumerate()
        .find(|(_, op)| &op.record.key.partition != partition)
    {
        return Err(StoreError::InvalidKey(format!(
            "batch spans partitions: {} and {} (index {idx})",
            partition, op.record.key.partition
        )));
    }
    Ok(Some(partition))
}

#[async_trait]
impl<S> KeyedStore for Arc<S>
where
    S: KeyedStore + ?Sized,
{
    async fn put(&self, record: Record) -> Result<u64, StoreError> {
        (**self).put(record).await
    }

    async fn put_if(
        &self,
        record: Record,
        condition: Condition,
    ) -> Result<WriteOutcome, StoreError> {
        (**self).put_if(record, condition).await
    }

    async fn get(&self, key: &TableKey) -> Result<Option<Record>, StoreError> {
        (**self).get(key).await
    }

    async fn query(
        &self,
        partition: &PartitionKey,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).query(partition, sort_prefix).await
    }

    async fn transact(&self, ops: Vec<ConditionalPut>) -> Result<TransactOutcome, StoreError> {
        (**self).transact(ops).await
    }

    async fn scan(
        &self,
        partition_prefix: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).scan(partition_prefix, sort_prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use stockyard_core::JobId;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
    }

    #[test]
    fn conditions_evaluate_against_current_version() {
        assert!(Condition::Always.holds(Some(3)));
        assert!(Condition::NotExists.holds(None));
        assert!(!Condition::NotExists.holds(Some(1)));
        assert!(Condition::VersionEquals(2).holds(Some(2)));
        assert!(!Condition::VersionEquals(2).holds(None));
        assert_eq!(
            Condition::from(ExpectedVersion::for_loaded(0)),
            Condition::NotExists
        );
    }

    #[test]
    fn records_round_trip_typed_values() {
        let key = TableKey::job(JobId::new());
        let rec = Record::from_value(key, &Doc { name: "a".into() }).unwrap();
        assert_eq!(rec.version, 0);
        assert_eq!(rec.decode::<Doc>().unwrap().name, "a");
    }

    #[test]
    fn non_object_values_are_rejected() {
        let key = TableKey::job(JobId::new());
        assert!(matches!(
            Record::from_value(key, &5),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn batches_must_share_a_partition() {
        let a = Record::new(TableKey::job(JobId::new()), Map::new());
        let b = Record::new(TableKey::job(JobId::new()), Map::new());
        let ops = vec![
            ConditionalPut::new(a, Condition::Always),
            ConditionalPut::new(b, Condition::Always),
        ];
        assert!(matches!(single_partition(&ops), Err(StoreError::InvalidKey(_))));
        assert!(single_partition(&[]).unwrap().is_none());
    }
}
