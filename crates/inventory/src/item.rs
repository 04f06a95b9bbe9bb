use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{Aggregate, AggregateRoot, DomainError, EventId, ItemId, JobId};
use stockyard_events::Event;

pub const DEFAULT_UNIT: &str = "each";

/// Descriptive (non-quantity) fields of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    pub unit: String,
    pub location: Option<String>,
    pub reorder_level: Option<i64>,
}

impl ItemDetails {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if matches!(self.reorder_level, Some(l) if l < 0) {
            return Err(DomainError::validation("reorder_level cannot be negative"));
        }
        Ok(())
    }
}

/// Persisted shape of an item root record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub details: ItemDetails,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemSnapshot {
    /// At or below the reorder level. Items without one are never low.
    pub fn is_low_stock(&self) -> bool {
        matches!(self.details.reorder_level, Some(l) if self.quantity <= l)
    }
}

/// Aggregate root: InventoryItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: ItemId,
    details: Option<ItemDetails>,
    quantity: i64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            details: None,
            quantity: 0,
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    /// Rehydrate from a stored root record loaded at `version`.
    pub fn from_snapshot(snapshot: ItemSnapshot, version: u64) -> Self {
        Self {
            id: snapshot.item_id,
            details: Some(snapshot.details),
            quantity: snapshot.quantity,
            created_at: Some(snapshot.created_at),
            updated_at: Some(snapshot.updated_at),
            version,
        }
    }

    /// Current state as a root record. `None` until the item exists.
    pub fn snapshot(&self) -> Option<ItemSnapshot> {
        let details = self.details.clone()?;
        let created_at = self.created_at?;
        Some(ItemSnapshot {
            item_id: self.id.clone(),
            details,
            quantity: self.quantity,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }

    pub fn exists(&self) -> bool {
        self.details.is_some()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn details(&self) -> Option<&ItemDetails> {
        self.details.as_ref()
    }

    pub fn is_low_stock(&self) -> bool {
        matches!(self.details.as_ref().and_then(|d| d.reorder_level), Some(l) if self.quantity <= l)
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: create (or refresh the details of) an item from an uploaded file row.
///
/// `opening_quantity` only applies when the item does not exist yet; imports
/// never overwrite the running quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportItem {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub opening_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: goods received into stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStock {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub note: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: goods consumed, optionally against a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConsumption {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub job_id: Option<JobId>,
    pub note: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    Import(ImportItem),
    RecordStock(RecordStock),
    RecordConsumption(RecordConsumption),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Stock,
    Consume,
}

/// Append-only stock movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub kind: MovementKind,
    /// Always positive; the sign comes from `kind`.
    pub quantity: i64,
    pub job_id: Option<JobId>,
    pub note: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn delta(&self) -> i64 {
        match self.kind {
            MovementKind::Stock => self.quantity,
            MovementKind::Consume => -self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemImported {
        item_id: ItemId,
        details: ItemDetails,
        opening_quantity: i64,
        occurred_at: DateTime<Utc>,
    },
    DetailsUpdated {
        item_id: ItemId,
        details: ItemDetails,
        occurred_at: DateTime<Utc>,
    },
    Moved(StockMovement),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemImported { .. } => "inventory.item.imported",
            InventoryEvent::DetailsUpdated { .. } => "inventory.item.details_updated",
            InventoryEvent::Moved(m) => match m.kind {
                MovementKind::Stock => "inventory.stock.received",
                MovementKind::Consume => "inventory.stock.consumed",
            },
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemImported { occurred_at, .. } => *occurred_at,
            InventoryEvent::DetailsUpdated { occurred_at, .. } => *occurred_at,
            InventoryEvent::Moved(m) => m.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemImported {
                item_id,
                details,
                opening_quantity,
                occurred_at,
            } => {
                self.id = item_id.clone();
                self.details = Some(details.clone());
                self.quantity = *opening_quantity;
                self.created_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
            }
            InventoryEvent::DetailsUpdated {
                details,
                occurred_at,
                ..
            } => {
                self.details = Some(details.clone());
                self.updated_at = Some(*occurred_at);
            }
            InventoryEvent::Moved(m) => {
                self.quantity += m.delta();
                self.updated_at = Some(m.occurred_at);
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::Import(cmd) => self.handle_import(cmd),
            InventoryCommand::RecordStock(cmd) => self.handle_stock(cmd),
            InventoryCommand::RecordConsumption(cmd) => self.handle_consume(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_item_id(&self, item_id: &ItemId) -> Result<(), DomainError> {
        if &self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("inventory item {}", self.id)));
        }
        Ok(())
    }

    fn handle_import(&self, cmd: &ImportItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_item_id(&cmd.item_id)?;
        cmd.details.validate()?;

        match &self.details {
            None => {
                if cmd.opening_quantity < 0 {
                    return Err(DomainError::validation("quantity cannot be negative"));
                }
                Ok(vec![InventoryEvent::ItemImported {
                    item_id: cmd.item_id.clone(),
                    details: cmd.details.clone(),
                    opening_quantity: cmd.opening_quantity,
                    occurred_at: cmd.occurred_at,
                }])
            }
            // Re-importing identical details is a no-op, which keeps redelivered files idempotent.
            Some(existing) if existing == &cmd.details => Ok(vec![]),
            Some(_) => Ok(vec![InventoryEvent::DetailsUpdated {
                item_id: cmd.item_id.clone(),
                details: cmd.details.clone(),
                occurred_at: cmd.occurred_at,
            }]),
        }
    }

    fn handle_stock(&self, cmd: &RecordStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_item_id(&cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.quantity.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::invariant("quantity overflow"));
        }

        Ok(vec![InventoryEvent::Moved(StockMovement {
            event_id: cmd.event_id,
            item_id: cmd.item_id.clone(),
            kind: MovementKind::Stock,
            quantity: cmd.quantity,
            job_id: None,
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &RecordConsumption) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_item_id(&cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.quantity - cmd.quantity < 0 {
            return Err(DomainError::invariant(format!(
                "stock cannot go negative (on hand {}, requested {})",
                self.quantity, cmd.quantity
            )));
        }

        Ok(vec![InventoryEvent::Moved(StockMovement {
            event_id: cmd.event_id,
            item_id: cmd.item_id.clone(),
            kind: MovementKind::Consume,
            quantity: cmd.quantity,
            job_id: cmd.job_id,
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku() -> ItemId {
        ItemId::parse("PIPE-15").unwrap()
    }

    fn details(name: &str) -> ItemDetails {
        ItemDetails {
            name: name.to_string(),
            unit: DEFAULT_UNIT.to_string(),
            location: Some("van-1".to_string()),
            reorder_level: Some(5),
        }
    }

    fn imported(qty: i64) -> InventoryItem {
        let mut item = InventoryItem::empty(sku());
        let events = item
            .handle(&InventoryCommand::Import(ImportItem {
                item_id: sku(),
                details: details("Copper pipe"),
                opening_quantity: qty,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            item.apply(e);
        }
        item
    }

    fn stock(qty: i64) -> InventoryCommand {
        InventoryCommand::RecordStock(RecordStock {
            event_id: EventId::new(),
            item_id: sku(),
            quantity: qty,
            note: None,
            actor: "tester".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn consume(qty: i64) -> InventoryCommand {
        InventoryCommand::RecordConsumption(RecordConsumption {
            event_id: EventId::new(),
            item_id: sku(),
            quantity: qty,
            job_id: None,
            note: None,
            actor: "tester".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn import_creates_item_with_opening_quantity() {
        let item = imported(12);
        assert!(item.exists());
        assert_eq!(item.quantity(), 12);
        assert_eq!(item.snapshot().unwrap().details.name, "Copper pipe");
    }

    #[test]
    fn reimport_with_same_details_emits_nothing() {
        let item = imported(12);
        let events = item
            .handle(&InventoryCommand::Import(ImportItem {
                item_id: sku(),
                details: details("Copper pipe"),
                opening_quantity: 99,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn reimport_updates_details_but_not_quantity() {
        let mut item = imported(12);
        let events = item
            .handle(&InventoryCommand::Import(ImportItem {
                item_id: sku(),
                details: details("Copper pipe 15mm"),
                opening_quantity: 99,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
        item.apply(&events[0]);
        assert_eq!(item.quantity(), 12);
        assert_eq!(item.details().unwrap().name, "Copper pipe 15mm");
    }

    #[test]
    fn movements_require_existing_item() {
        let item = InventoryItem::empty(sku());
        assert!(matches!(item.handle(&stock(1)), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let item = imported(1);
        assert!(matches!(item.handle(&stock(0)), Err(DomainError::Validation(_))));
        assert!(matches!(item.handle(&consume(-2)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn consumption_cannot_drive_stock_negative() {
        let item = imported(3);
        assert!(matches!(
            item.handle(&consume(4)),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(item.handle(&consume(3)).is_ok());
    }

    #[test]
    fn low_stock_compares_against_reorder_level() {
        assert!(imported(5).is_low_stock());
        assert!(!imported(6).is_low_stock());
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let item = imported(4);
        let snap = item.snapshot().unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["name"], "Copper pipe");
        let back: ItemSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(InventoryItem::from_snapshot(back, 3).quantity(), 4);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the running quantity equals opening + received - consumed
            /// over every accepted movement, and never goes negative.
            #[test]
            fn quantity_equals_sum_of_accepted_movements(
                opening in 0i64..100,
                ops in proptest::collection::vec((any::<bool>(), 1i64..50), 0..60)
            ) {
                let mut item = imported(opening);
                let mut received = 0i64;
                let mut consumed = 0i64;

                for (is_stock, qty) in ops {
                    let cmd = if is_stock { stock(qty) } else { consume(qty) };
                    if let Ok(events) = item.handle(&cmd) {
                        for e in &events {
                            if let InventoryEvent::Moved(m) = e {
                                match m.kind {
                                    MovementKind::Stock => received += m.quantity,
                                    MovementKind::Consume => consumed += m.quantity,
                                }
                            }
                            item.apply(e);
                        }
                    }
                    prop_assert!(item.quantity() >= 0);
                }

                prop_assert_eq!(item.quantity(), opening + received - consumed);
            }
        }
    }
}
