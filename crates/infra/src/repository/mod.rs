//! Typed persistence for each domain on top of the keyed store.
//!
//! Repositories own the key layout and the conditional-write protocol of
//! their records; handlers and ingestion pipelines only speak domain types.

pub mod items;
pub mod jobs;
pub mod templates;

pub use items::{ImportOutcome, ItemRepository, MovementReceipt};
pub use jobs::JobRepository;
pub use templates::TemplateRepository;

/// A decoded record together with the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub value: T,
    pub version: u64,
}

/// Attempts made against a contended version-checked write before giving up.
pub const MAX_CONFLICT_RETRIES: u32 = 8;
