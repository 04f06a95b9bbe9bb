//! Inventory domain module.
//!
//! Business rules for inventory items and their stock movements, implemented
//! as deterministic domain logic (no IO, no HTTP, no storage). The running
//! quantity lives on the item; every change to it is an append-only
//! [`StockMovement`].

pub mod item;

pub use item::{
    DEFAULT_UNIT, ImportItem, InventoryCommand, InventoryEvent, InventoryItem, ItemDetails, ItemSnapshot,
    MovementKind, RecordConsumption, RecordStock, StockMovement,
};
