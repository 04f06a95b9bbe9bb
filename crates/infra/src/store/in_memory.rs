use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use stockyard_core::{PartitionKey, TableKey};

use super::r#trait::{
    Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome, WriteOutcome,
    single_partition,
};

#[derive(Debug, Clone)]
struct Item {
    attributes: Map<String, JsonValue>,
    version: u64,
}

/// In-memory keyed store.
///
/// Intended for tests/dev. A single lock serializes writers, which makes
/// conditional writes and batches trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryKeyedStore {
    items: RwLock<BTreeMap<TableKey, Item>>,
}

impl InMemoryKeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_record(key: &TableKey, item: &Item) -> Record {
        Record {
            key: key.clone(),
            attributes: item.attributes.clone(),
            version: item.version,
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl KeyedStore for InMemoryKeyedStore {
    async fn put_if(
        &self,
        record: Record,
        condition: Condition,
    ) -> Result<WriteOutcome, StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let current = items.get(&record.key).map(|i| i.version);

        if !condition.holds(current) {
            return Ok(WriteOutcome::ConditionFailed {
                current_version: current,
            });
        }

        let version = current.unwrap_or(0) + 1;
        items.insert(
            record.key,
            Item {
                attributes: record.attributes,
                version,
            },
        );
        Ok(WriteOutcome::Written { version })
    }

    async fn get(&self, key: &TableKey) -> Result<Option<Record>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(key).map(|item| Self::to_record(key, item)))
    }

    async fn query(
        &self,
        partition: &PartitionKey,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items
            .iter()
            .filter(|(k, _)| &k.partition == partition)
            .filter(|(k, _)| sort_prefix.is_none_or(|p| k.sort.as_str().starts_with(p)))
            .map(|(k, item)| Self::to_record(k, item))
            .collect())
    }

    async fn transact(&self, ops: Vec<ConditionalPut>) -> Result<TransactOutcome, StoreError> {
        if single_partition(&ops)?.is_none() {
            return Ok(TransactOutcome::Committed { versions: vec![] });
        }

        let mut items = self.items.write().map_err(|_| poisoned())?;

        // Check every condition before touching anything.
        let mut versions = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let current = items.get(&op.record.key).map(|i| i.version);
            if !op.condition.holds(current) {
                return Ok(TransactOutcome::ConditionFailed {
                    index,
                    current_version: current,
                });
            }
            versions.push(current.unwrap_or(0) + 1);
        }

        for (op, version) in ops.into_iter().zip(&versions) {
            items.insert(
                op.record.key,
                Item {
                    attributes: op.record.attributes,
                    version: *version,
                },
            );
        }

        Ok(TransactOutcome::Committed { versions })
    }

    async fn scan(
        &self,
        partition_prefix: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items
            .iter()
            .filter(|(k, _)| k.partition.as_str().starts_with(partition_prefix))
            .filter(|(k, _)| sort_prefix.is_none_or(|p| k.sort.as_str().starts_with(p)))
            .map(|(k, item)| Self::to_record(k, item))
            .collect())
    }
}
