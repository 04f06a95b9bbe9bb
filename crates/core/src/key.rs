//! Typed single-table key schema.
//!
//! Every domain shares one keyed table. Keys are only ever built through the
//! constructors in this module so two domains can never produce colliding
//! `(partition, sort)` pairs:
//!
//! | Entity                 | partition                    | sort                     |
//! |------------------------|------------------------------|--------------------------|
//! | Inventory item root    | `INVENTORY#<item_id>`        | `ITEM`                   |
//! | Stock/consume event    | `INVENTORY#<item_id>`        | `STOCKEVENT#<event_id>`  |
//! | Job root               | `JOB#<job_id>`               | `ROOT`                   |
//! | Job history entry      | `JOB#<job_id>`               | `HISTORY#<entry_id>`     |
//! | Job template root      | `JOBTEMPLATE#<template_id>`  | `ROOT`                   |
//! | Job template line      | `JOBTEMPLATE#<template_id>`  | `LINE#<index:06>`        |
//! | File processing status | `FILE#<bucket>/<object_key>` | `STATUS`                 |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{EventId, HistoryEntryId, ItemId, JobId, TemplateId};

pub const SEPARATOR: char = '#';
const MAX_KEY_LEN: usize = 1024;

/// Partition prefixes (entity collections).
pub mod prefix {
    pub const INVENTORY: &str = "INVENTORY#";
    pub const JOB: &str = "JOB#";
    pub const JOB_TEMPLATE: &str = "JOBTEMPLATE#";
    pub const FILE: &str = "FILE#";
}

/// Sort-key markers and prefixes (positions within a collection).
pub mod sort {
    pub const ITEM: &str = "ITEM";
    pub const ROOT: &str = "ROOT";
    pub const STATUS: &str = "STATUS";
    pub const STOCK_EVENT: &str = "STOCKEVENT#";
    pub const HISTORY: &str = "HISTORY#";
    pub const LINE: &str = "LINE#";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key component is empty")]
    Empty,

    #[error("key component contains reserved separator '#': {0}")]
    ReservedSeparator(String),

    #[error("key component contains control characters")]
    ControlCharacter,

    #[error("key longer than {MAX_KEY_LEN} bytes")]
    TooLong,
}

fn check_segment(segment: &str) -> Result<(), KeyError> {
    if segment.is_empty() {
        return Err(KeyError::Empty);
    }
    if segment.contains(SEPARATOR) {
        return Err(KeyError::ReservedSeparator(segment.to_string()));
    }
    if segment.chars().any(char::is_control) {
        return Err(KeyError::ControlCharacter);
    }
    Ok(())
}

fn check_raw(raw: &str) -> Result<(), KeyError> {
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }
    if raw.len() > MAX_KEY_LEN {
        return Err(KeyError::TooLong);
    }
    if raw.chars().any(char::is_control) {
        return Err(KeyError::ControlCharacter);
    }
    Ok(())
}

/// Partition key: identifies a logical entity collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Accept an already-encoded partition key (e.g. read back from storage).
    pub fn from_raw(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        check_raw(&raw)?;
        Ok(Self(raw))
    }

    pub fn inventory(item_id: &ItemId) -> Self {
        // ItemId's character set already excludes the separator.
        Self(format!("{}{}", prefix::INVENTORY, item_id))
    }

    pub fn job(job_id: JobId) -> Self {
        Self(format!("{}{}", prefix::JOB, job_id))
    }

    pub fn job_template(template_id: TemplateId) -> Self {
        Self(format!("{}{}", prefix::JOB_TEMPLATE, template_id))
    }

    pub fn file(bucket: &str, object_key: &str) -> Result<Self, KeyError> {
        check_segment(bucket)?;
        check_segment(object_key)?;
        let raw = format!("{}{}/{}", prefix::FILE, bucket, object_key);
        check_raw(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort key: identifies a record's position within its partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(String);

impl SortKey {
    pub fn from_raw(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        check_raw(&raw)?;
        Ok(Self(raw))
    }

    pub fn item() -> Self {
        Self(sort::ITEM.to_string())
    }

    pub fn root() -> Self {
        Self(sort::ROOT.to_string())
    }

    pub fn status() -> Self {
        Self(sort::STATUS.to_string())
    }

    pub fn stock_event(event_id: EventId) -> Self {
        Self(format!("{}{}", sort::STOCK_EVENT, event_id))
    }

    pub fn history(entry_id: HistoryEntryId) -> Self {
        Self(format!("{}{}", sort::HISTORY, entry_id))
    }

    pub fn template_line(index: u32) -> Self {
        Self(format!("{}{:06}", sort::LINE, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SortKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full `(partition, sort)` key of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub partition: PartitionKey,
    pub sort: SortKey,
}

impl TableKey {
    pub fn new(partition: PartitionKey, sort: SortKey) -> Self {
        Self { partition, sort }
    }

    pub fn inventory_item(item_id: &ItemId) -> Self {
        Self::new(PartitionKey::inventory(item_id), SortKey::item())
    }

    pub fn stock_event(item_id: &ItemId, event_id: EventId) -> Self {
        Self::new(PartitionKey::inventory(item_id), SortKey::stock_event(event_id))
    }

    pub fn job(job_id: JobId) -> Self {
        Self::new(PartitionKey::job(job_id), SortKey::root())
    }

    pub fn job_history(job_id: JobId, entry_id: HistoryEntryId) -> Self {
        Self::new(PartitionKey::job(job_id), SortKey::history(entry_id))
    }

    pub fn job_template(template_id: TemplateId) -> Self {
        Self::new(PartitionKey::job_template(template_id), SortKey::root())
    }

    pub fn template_line(template_id: TemplateId, index: u32) -> Self {
        Self::new(
            PartitionKey::job_template(template_id),
            SortKey::template_line(index),
        )
    }

    pub fn file_status(bucket: &str, object_key: &str) -> Result<Self, KeyError> {
        Ok(Self::new(PartitionKey::file(bucket, object_key)?, SortKey::status()))
    }
}

impl core::fmt::Display for TableKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.partition, self.sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_never_share_partitions() {
        let job = JobId::new();
        let template = TemplateId::from_uuid(*job.as_uuid());
        assert_ne!(PartitionKey::job(job), PartitionKey::job_template(template));
    }

    #[test]
    fn stock_event_and_root_share_item_partition() {
        let item = ItemId::parse("BOLT-M8").unwrap();
        let root = TableKey::inventory_item(&item);
        let ev = TableKey::stock_event(&item, EventId::new());
        assert_eq!(root.partition, ev.partition);
        assert_eq!(root.partition.as_str(), "INVENTORY#BOLT-M8");
        assert!(ev.sort.as_str().starts_with(sort::STOCK_EVENT));
    }

    #[test]
    fn template_lines_sort_numerically() {
        let a = SortKey::template_line(2);
        let b = SortKey::template_line(10);
        assert!(a < b);
    }

    #[test]
    fn file_partition_rejects_separator() {
        assert!(matches!(
            PartitionKey::file("bucket", "a#b.csv"),
            Err(KeyError::ReservedSeparator(_))
        ));
        assert!(matches!(PartitionKey::file("", "x.csv"), Err(KeyError::Empty)));
        let ok = TableKey::file_status("uploads", "uploads/1/stock.csv").unwrap();
        assert_eq!(ok.partition.as_str(), "FILE#uploads/uploads/1/stock.csv");
    }

    #[test]
    fn raw_keys_reject_control_characters() {
        assert!(SortKey::from_raw("ok").is_ok());
        assert!(SortKey::from_raw("bad\n").is_err());
        assert!(PartitionKey::from_raw("").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Event sort keys preserve the creation order of their UUIDv7 ids.
            #[test]
            fn stock_event_keys_follow_id_order(a in any::<u128>(), b in any::<u128>()) {
                let ea = EventId::from_uuid(uuid::Uuid::from_u128(a));
                let eb = EventId::from_uuid(uuid::Uuid::from_u128(b));
                prop_assert_eq!(ea.cmp(&eb), SortKey::stock_event(ea).cmp(&SortKey::stock_event(eb)));
            }
        }
    }
}
