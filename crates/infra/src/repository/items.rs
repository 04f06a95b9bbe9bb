use std::sync::Arc;

use tracing::{debug, instrument, warn};

use stockyard_core::key::{prefix, sort};
use stockyard_core::{Aggregate, AggregateRoot, ExpectedVersion, ItemId, PartitionKey, TableKey};
use stockyard_inventory::{
    ImportItem, InventoryCommand, InventoryEvent, InventoryItem, ItemSnapshot, StockMovement,
};

use super::MAX_CONFLICT_RETRIES;
use crate::retry::RetryPolicy;
use crate::services::{ServiceError, ServiceResult};
use crate::store::{Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome, WriteOutcome};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Result of an accepted stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementReceipt {
    pub movement: StockMovement,
    /// Item quantity right after this call.
    pub quantity: i64,
    /// `true` when the event id was already recorded and nothing was applied.
    pub replayed: bool,
}

/// Inventory item roots and their stock movement records.
///
/// A movement is always written in one batch with the root:
/// `[event NotExists, root VersionEquals(v)]`. Both live in the item's
/// partition, so the running quantity never drifts from the events.
/// A lost version race reloads and tries again after a jittered pause.
#[derive(Clone)]
pub struct ItemRepository {
    store: Arc<dyn KeyedStore>,
    contention: RetryPolicy,
}

impl ItemRepository {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store,
            contention: RetryPolicy::contention(MAX_CONFLICT_RETRIES),
        }
    }

    /// Pause before the next attempt, or `false` once attempts are used up.
    async fn back_off(&self, attempt: u32) -> bool {
        if !self.contention.should_retry(attempt) {
            return false;
        }
        tokio::time::sleep(self.contention.delay_for_attempt(attempt)).await;
        true
    }

    /// Load an item; absent items come back as [`InventoryItem::empty`].
    pub async fn load(&self, item_id: &ItemId) -> Result<InventoryItem, StoreError> {
        match self.store.get(&TableKey::inventory_item(item_id)).await? {
            Some(rec) => {
                let snapshot: ItemSnapshot = rec.decode()?;
                Ok(InventoryItem::from_snapshot(snapshot, rec.version))
            }
            None => Ok(InventoryItem::empty(item_id.clone())),
        }
    }

    pub async fn list(&self) -> Result<Vec<ItemSnapshot>, StoreError> {
        self.store
            .scan(prefix::INVENTORY, Some(sort::ITEM))
            .await?
            .iter()
            .map(Record::decode)
            .collect()
    }

    /// Most recent movements of one item, newest first.
    pub async fn recent_movements(
        &self,
        item_id: &ItemId,
        limit: usize,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let mut movements = self
            .store
            .query(&PartitionKey::inventory(item_id), Some(sort::STOCK_EVENT))
            .await?
            .iter()
            .map(Record::decode::<StockMovement>)
            .collect::<Result<Vec<_>, _>>()?;

        // Client-supplied request ids are not time-ordered.
        movements.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        movements.truncate(limit);
        Ok(movements)
    }

    /// Create the item or refresh its descriptive fields.
    ///
    /// The running quantity is never touched for an existing item.
    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id))]
    pub async fn import(&self, cmd: ImportItem) -> ServiceResult<ImportOutcome> {
        let item_id = cmd.item_id.clone();
        let key = TableKey::inventory_item(&item_id);
        let command = InventoryCommand::Import(cmd);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut item = self.load(&item_id).await?;
            let existed = item.exists();

            let events = item.handle(&command)?;
            if events.is_empty() {
                return Ok(ImportOutcome::Unchanged);
            }
            for event in &events {
                item.apply(event);
            }

            let snapshot = item
                .snapshot()
                .ok_or_else(|| ServiceError::Invariant("imported item has no details".to_string()))?;
            let record = Record::from_value(key.clone(), &snapshot)?;
            let condition = Condition::from(ExpectedVersion::for_loaded(item.version()));

            match self.store.put_if(record, condition).await? {
                WriteOutcome::Written { .. } if existed => return Ok(ImportOutcome::Updated),
                WriteOutcome::Written { .. } => return Ok(ImportOutcome::Created),
                WriteOutcome::ConditionFailed { current_version } => {
                    debug!(attempt, ?current_version, "item changed concurrently, reloading");
                    if !self.back_off(attempt).await {
                        break;
                    }
                }
            }
        }

        warn!("giving up on contended item import");
        Err(ServiceError::Conflict(format!(
            "item {key} kept changing during import"
        )))
    }

    /// Apply a stock or consume command.
    ///
    /// Re-sending a command with an already recorded `event_id` returns the
    /// stored movement with `replayed = true` and changes nothing.
    #[instrument(skip(self, command))]
    pub async fn record_movement(&self, command: InventoryCommand) -> ServiceResult<MovementReceipt> {
        let (item_id, event_id) = match &command {
            InventoryCommand::RecordStock(c) => (c.item_id.clone(), c.event_id),
            InventoryCommand::RecordConsumption(c) => (c.item_id.clone(), c.event_id),
            InventoryCommand::Import(_) => {
                return Err(ServiceError::validation("imports are not stock movements"));
            }
        };
        let event_key = TableKey::stock_event(&item_id, event_id);
        let root_key = TableKey::inventory_item(&item_id);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(existing) = self.store.get(&event_key).await? {
                let movement: StockMovement = existing.decode()?;
                let item = self.load(&item_id).await?;
                debug!(%event_id, "movement already recorded");
                return Ok(MovementReceipt {
                    movement,
                    quantity: item.quantity(),
                    replayed: true,
                });
            }

            let mut item = self.load(&item_id).await?;
            let loaded_version = item.version();
            let movement = match item.handle(&command)?.as_slice() {
                [InventoryEvent::Moved(m)] => m.clone(),
                other => {
                    return Err(ServiceError::Invariant(format!(
                        "expected exactly one movement, got {}",
                        other.len()
                    )));
                }
            };
            item.apply(&InventoryEvent::Moved(movement.clone()));

            let snapshot = item
                .snapshot()
                .ok_or_else(|| ServiceError::Invariant("moved item has no details".to_string()))?;
            let ops = vec![
                ConditionalPut::new(Record::from_value(event_key.clone(), &movement)?, Condition::NotExists),
                ConditionalPut::new(
                    Record::from_value(root_key.clone(), &snapshot)?,
                    Condition::VersionEquals(loaded_version),
                ),
            ];

            match self.store.transact(ops).await? {
                TransactOutcome::Committed { .. } => {
                    return Ok(MovementReceipt {
                        quantity: item.quantity(),
                        movement,
                        replayed: false,
                    });
                }
                TransactOutcome::ConditionFailed { index, .. } => {
                    // index 0: a concurrent duplicate won; the next pass returns it.
                    debug!(attempt, index, "stock aggregate changed concurrently, reloading");
                    if !self.back_off(attempt).await {
                        break;
                    }
                }
            }
        }

        warn!(%item_id, "giving up on contended stock movement");
        Err(ServiceError::Conflict(format!(
            "item {item_id} is being updated concurrently, retry later"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockyard_core::{EventId, JobId};
    use stockyard_inventory::{ItemDetails, RecordConsumption, RecordStock};

    use async_trait::async_trait;

    use crate::store::InMemoryKeyedStore;

    /// Hands control back to the scheduler mid-call so concurrent writers
    /// interleave between their read and their conditional write.
    struct InterleavingStore(InMemoryKeyedStore);

    #[async_trait]
    impl KeyedStore for InterleavingStore {
        async fn put_if(&self, record: Record, condition: Condition) -> Result<WriteOutcome, StoreError> {
            self.0.put_if(record, condition).await
        }

        async fn get(&self, key: &TableKey) -> Result<Option<Record>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }

        async fn query(&self, partition: &PartitionKey, sort_prefix: Option<&str>) -> Result<Vec<Record>, StoreError> {
            self.0.query(partition, sort_prefix).await
        }

        async fn transact(&self, ops: Vec<ConditionalPut>) -> Result<TransactOutcome, StoreError> {
            tokio::task::yield_now().await;
            self.0.transact(ops).await
        }

        async fn scan(&self, partition_prefix: &str, sort_prefix: Option<&str>) -> Result<Vec<Record>, StoreError> {
            self.0.scan(partition_prefix, sort_prefix).await
        }
    }

    fn repo() -> ItemRepository {
        ItemRepository::new(Arc::new(InMemoryKeyedStore::new()))
    }

    fn sku(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    fn import(id: &str, name: &str, qty: i64) -> ImportItem {
        ImportItem {
            item_id: sku(id),
            details: ItemDetails {
                name: name.to_string(),
                unit: "each".to_string(),
                location: Some("A1".to_string()),
                reorder_level: Some(2),
            },
            opening_quantity: qty,
            occurred_at: Utc::now(),
        }
    }

    fn stock(id: &str, qty: i64) -> InventoryCommand {
        InventoryCommand::RecordStock(RecordStock {
            event_id: EventId::new(),
            item_id: sku(id),
            quantity: qty,
            note: None,
            actor: "tester".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn consume(id: &str, qty: i64) -> InventoryCommand {
        InventoryCommand::RecordConsumption(RecordConsumption {
            event_id: EventId::new(),
            item_id: sku(id),
            quantity: qty,
            job_id: Some(JobId::new()),
            note: None,
            actor: "tester".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn import_creates_then_updates_then_is_unchanged() {
        let repo = repo();
        assert_eq!(repo.import(import("bolt", "Bolt", 10)).await.unwrap(), ImportOutcome::Created);
        assert_eq!(repo.import(import("BOLT", "Bolt", 99)).await.unwrap(), ImportOutcome::Unchanged);
        assert_eq!(repo.import(import("BOLT", "Bolt M8", 99)).await.unwrap(), ImportOutcome::Updated);

        let item = repo.load(&sku("BOLT")).await.unwrap();
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.details().unwrap().name, "Bolt M8");
    }

    #[tokio::test]
    async fn movements_update_quantity_and_are_listed() {
        let repo = repo();
        repo.import(import("NUT", "Nut", 10)).await.unwrap();

        assert_eq!(repo.record_movement(stock("NUT", 5)).await.unwrap().quantity, 15);
        assert_eq!(repo.record_movement(consume("NUT", 4)).await.unwrap().quantity, 11);

        let recent = repo.recent_movements(&sku("NUT"), 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.iter().map(StockMovement::delta).sum::<i64>(), 1);
    }

    #[tokio::test]
    async fn over_consumption_is_rejected_without_writes() {
        let repo = repo();
        repo.import(import("NUT", "Nut", 3)).await.unwrap();

        let err = repo.record_movement(consume("NUT", 4)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Invariant(_)));
        assert_eq!(repo.load(&sku("NUT")).await.unwrap().quantity(), 3);
        assert!(repo.recent_movements(&sku("NUT"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_event_id_is_applied_once() {
        let repo = repo();
        repo.import(import("NUT", "Nut", 0)).await.unwrap();

        let cmd = stock("NUT", 7);
        let first = repo.record_movement(cmd.clone()).await.unwrap();
        let second = repo.record_movement(cmd).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.movement, first.movement);
        assert_eq!(second.quantity, 7);
    }

    #[tokio::test]
    async fn unknown_items_cannot_move() {
        let err = repo().record_movement(stock("GHOST", 1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_movements_all_land() {
        let repo = repo();
        repo.import(import("NUT", "Nut", 10)).await.unwrap();

        let a = tokio::spawn({
            let repo = repo.clone();
            async move { repo.record_movement(stock("NUT", 5)).await }
        });
        let b = tokio::spawn({
            let repo = repo.clone();
            async move { repo.record_movement(stock("NUT", 3)).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(repo.load(&sku("NUT")).await.unwrap().quantity(), 18);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn contended_movements_back_off_until_all_land() {
        let repo = ItemRepository::new(Arc::new(InterleavingStore(InMemoryKeyedStore::new())));
        repo.import(import("NUT", "Nut", 10)).await.unwrap();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.record_movement(stock("NUT", 1)).await })
            })
            .collect();
        for handle in handles {
            let receipt = handle.await.unwrap().unwrap();
            assert!(!receipt.replayed);
        }

        assert_eq!(repo.load(&sku("NUT")).await.unwrap().quantity(), 22);
        assert_eq!(repo.recent_movements(&sku("NUT"), 50).await.unwrap().len(), 12);
    }
}
