//! Single-table keyed store boundary.
//!
//! Every domain persists into one logical table addressed by
//! `(partition, sort)` keys built with `stockyard_core::key`. The trait makes
//! no storage assumptions: an in-memory backend serves tests/dev and a
//! Postgres backend serves deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryKeyedStore;
pub use postgres::PostgresKeyedStore;
pub use r#trait::{
    Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome, WriteOutcome,
};
