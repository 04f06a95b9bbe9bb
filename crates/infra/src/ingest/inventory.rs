use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use stockyard_core::ItemId;
use stockyard_events::ObjectCreated;
use stockyard_inventory::{DEFAULT_UNIT, ImportItem, ItemDetails};

use super::table::{CsvRow, parse_csv};
use super::{FileFormat, IngestError, ParseError, ParsedFile, ParsedRow, RowTally, row_failure};
use crate::config::ConfigProvider;
use crate::repository::ItemRepository;
use crate::retry::RetryPolicy;
use crate::services::ServiceError;

const REQUIRED: &[&str] = &["sku", "name"];

/// One inventory file row.
///
/// `reorder_level` stays `None` when the cell is blank so the configured
/// low-stock default can fill it in at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub opening_quantity: i64,
}

/// Inventory spreadsheet: `sku,name[,quantity,unit,location,reorder_level]`.
#[derive(Clone)]
pub struct InventoryFormat {
    items: ItemRepository,
    config: Arc<dyn ConfigProvider>,
}

impl InventoryFormat {
    pub fn new(items: ItemRepository, config: Arc<dyn ConfigProvider>) -> Self {
        Self { items, config }
    }
}

fn parse_row(row: &CsvRow<'_>) -> Result<InventoryRow, String> {
    let item_id = ItemId::parse(row.required("sku")?).map_err(|e| e.to_string())?;
    let name = row.required("name")?.to_string();
    let opening_quantity = row.non_negative("quantity")?.unwrap_or(0);

    Ok(InventoryRow {
        item_id,
        details: ItemDetails {
            name,
            unit: row.get("unit").unwrap_or(DEFAULT_UNIT).to_string(),
            location: row.get("location").map(str::to_string),
            reorder_level: row.non_negative("reorder_level")?,
        },
        opening_quantity,
    })
}

#[async_trait]
impl FileFormat for InventoryFormat {
    type Row = InventoryRow;

    fn name(&self) -> &'static str {
        "inventory"
    }

    fn parse(&self, data: &[u8]) -> ParsedFile<InventoryRow> {
        parse_csv(data, REQUIRED, parse_row)
    }

    async fn write(
        &self,
        _source: &ObjectCreated,
        rows: Vec<ParsedRow<InventoryRow>>,
        retry: &RetryPolicy,
    ) -> Result<RowTally, IngestError> {
        let defaults = self.config.app_config().await?;
        let items = &self.items;
        let mut tally = RowTally::default();

        for ParsedRow { row, value } in rows {
            let mut details = value.details;
            details.reorder_level = details.reorder_level.or(defaults.low_stock_default);
            let cmd = ImportItem {
                item_id: value.item_id,
                details,
                opening_quantity: value.opening_quantity,
                occurred_at: Utc::now(),
            };
            let cmd = &cmd;

            let outcome = retry
                .run("import inventory row", ServiceError::is_transient, move || async move {
                    items.import(cmd.clone()).await
                })
                .await;

            match outcome {
                Ok(outcome) => {
                    debug!(row, item_id = %cmd.item_id, ?outcome, "row imported");
                    tally.success += 1;
                }
                Err(e) => tally.errors.push(ParseError::new(row, row_failure(e)?)),
            }
        }

        Ok(tally)
    }
}
