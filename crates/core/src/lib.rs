//! `stockyard-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits and the typed
//! single-table key schema shared by every domain.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod key;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{EventId, HistoryEntryId, ItemId, JobId, TemplateId};
pub use key::{KeyError, PartitionKey, SortKey, TableKey};
