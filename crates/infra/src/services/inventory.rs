use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use stockyard_core::{EventId, ItemId, JobId};
use stockyard_inventory::{InventoryCommand, ItemSnapshot, RecordConsumption, RecordStock, StockMovement};

use super::{ServiceError, ServiceResult};
use crate::repository::{ItemRepository, JobRepository, MovementReceipt};

/// Stock movements returned alongside a single-item lookup.
pub const RECENT_MOVEMENTS: usize = 20;
const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub location: Option<String>,
    pub low_stock: bool,
}

/// A received or consumed quantity as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub item_id: String,
    pub quantity: i64,
    pub note: Option<String>,
    /// Idempotency key; repeating it returns the first result.
    pub request_id: Option<Uuid>,
    /// Consumption only.
    pub job_id: Option<JobId>,
}

/// Inventory reads plus the stock and consume write paths.
#[derive(Clone)]
pub struct InventoryService {
    items: ItemRepository,
    jobs: JobRepository,
}

impl InventoryService {
    pub fn new(items: ItemRepository, jobs: JobRepository) -> Self {
        Self { items, jobs }
    }

    pub async fn list(&self, filter: &InventoryFilter) -> ServiceResult<Vec<ItemSnapshot>> {
        let location = filter.location.as_deref().map(str::trim).filter(|l| !l.is_empty());
        let mut items: Vec<ItemSnapshot> = self
            .items
            .list()
            .await?
            .into_iter()
            .filter(|i| {
                location.is_none_or(|l| {
                    i.details
                        .location
                        .as_deref()
                        .is_some_and(|il| il.eq_ignore_ascii_case(l))
                })
            })
            .filter(|i| !filter.low_stock || i.is_low_stock())
            .collect();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(items)
    }

    /// One item with its most recent movements, newest first.
    pub async fn item(&self, raw_id: &str) -> ServiceResult<(ItemSnapshot, Vec<StockMovement>)> {
        let item_id = ItemId::parse(raw_id)?;
        let snapshot = self
            .items
            .load(&item_id)
            .await?
            .snapshot()
            .ok_or_else(|| ServiceError::not_found(format!("inventory item {item_id}")))?;
        let recent = self.items.recent_movements(&item_id, RECENT_MOVEMENTS).await?;
        Ok((snapshot, recent))
    }

    #[instrument(skip(self, req), fields(item_id = %req.item_id, quantity = req.quantity))]
    pub async fn stock(&self, req: MovementRequest, actor: &str) -> ServiceResult<MovementReceipt> {
        let (item_id, event_id) = validate(&req)?;
        if req.job_id.is_some() {
            return Err(ServiceError::validation("job_id only applies to consumption"));
        }

        let receipt = self
            .items
            .record_movement(InventoryCommand::RecordStock(RecordStock {
                event_id,
                item_id,
                quantity: req.quantity,
                note: req.note,
                actor: actor.to_string(),
                occurred_at: Utc::now(),
            }))
            .await?;
        info!(quantity_after = receipt.quantity, replayed = receipt.replayed, "stock recorded");
        Ok(receipt)
    }

    #[instrument(skip(self, req), fields(item_id = %req.item_id, quantity = req.quantity))]
    pub async fn consume(&self, req: MovementRequest, actor: &str) -> ServiceResult<MovementReceipt> {
        let (item_id, event_id) = validate(&req)?;
        if let Some(job_id) = req.job_id {
            if self.jobs.get(job_id).await?.is_none() {
                return Err(ServiceError::not_found(format!("job {job_id}")));
            }
        }

        let receipt = self
            .items
            .record_movement(InventoryCommand::RecordConsumption(RecordConsumption {
                event_id,
                item_id,
                quantity: req.quantity,
                job_id: req.job_id,
                note: req.note,
                actor: actor.to_string(),
                occurred_at: Utc::now(),
            }))
            .await?;
        info!(quantity_after = receipt.quantity, replayed = receipt.replayed, "consumption recorded");
        Ok(receipt)
    }
}

fn validate(req: &MovementRequest) -> ServiceResult<(ItemId, EventId)> {
    let item_id = ItemId::parse(&req.item_id)?;
    if req.quantity <= 0 {
        return Err(ServiceError::validation("quantity must be a positive integer"));
    }
    if req.note.as_deref().is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
        return Err(ServiceError::validation(format!(
            "note longer than {MAX_NOTE_LEN} characters"
        )));
    }
    let event_id = req.request_id.map(EventId::from_uuid).unwrap_or_default();
    Ok((item_id, event_id))
}
