//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a job record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

/// Identifier of a job template.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(Uuid);

/// Identifier of a stock movement (stock or consume event).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

/// Identifier of a job history entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntryId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered), so the textual form sorts in creation
            /// order. Prefer passing IDs explicitly in tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(JobId, "JobId");
impl_uuid_newtype!(TemplateId, "TemplateId");
impl_uuid_newtype!(EventId, "EventId");
impl_uuid_newtype!(HistoryEntryId, "HistoryEntryId");

impl TemplateId {
    /// Deterministic template id for templates materialised from an uploaded file.
    ///
    /// The same `(bucket, object key, template name)` always maps to the same id,
    /// so re-ingesting a file addresses the records it wrote the first time.
    pub fn derived(bucket: &str, object_key: &str, template_name: &str) -> Self {
        let name = format!("stockyard:template:{bucket}/{object_key}#{template_name}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
    }
}

const ITEM_ID_MAX_LEN: usize = 64;

/// Identifier of an inventory item: its normalized SKU.
///
/// Inventory items originate from uploaded spreadsheets keyed by SKU, so the SKU
/// itself is the identity. Normalization trims and upper-cases the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let sku = raw.trim().to_uppercase();
        if sku.is_empty() {
            return Err(DomainError::invalid_id("ItemId: sku cannot be empty"));
        }
        if sku.len() > ITEM_ID_MAX_LEN {
            return Err(DomainError::invalid_id(format!(
                "ItemId: sku longer than {ITEM_ID_MAX_LEN} characters"
            )));
        }
        if let Some(c) = sku
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
        {
            return Err(DomainError::invalid_id(format!(
                "ItemId: invalid character {c:?} in sku"
            )));
        }
        Ok(Self(sku))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_is_normalized() {
        let id = ItemId::parse("  ab-12.x ").unwrap();
        assert_eq!(id.as_str(), "AB-12.X");
    }

    #[test]
    fn item_id_rejects_separator_and_blank() {
        assert!(ItemId::parse("A#B").is_err());
        assert!(ItemId::parse("   ").is_err());
        assert!(ItemId::parse("has space").is_err());
    }

    #[test]
    fn item_id_deserializes_through_validation() {
        let ok: ItemId = serde_json::from_str("\"pipe-15mm\"").unwrap();
        assert_eq!(ok.as_str(), "PIPE-15MM");
        assert!(serde_json::from_str::<ItemId>("\"a#b\"").is_err());
    }

    #[test]
    fn derived_template_ids_are_stable() {
        let a = TemplateId::derived("templates", "uploads/x/file.csv", "Boiler service");
        let b = TemplateId::derived("templates", "uploads/x/file.csv", "Boiler service");
        let c = TemplateId::derived("templates", "uploads/x/file.csv", "Gas check");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn uuid_ids_parse_from_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
