use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockyard_core::{EventId, ItemId, JobId, TemplateId};
use stockyard_infra::blob::PresignedUrl;
use stockyard_infra::repository::MovementReceipt;
use stockyard_infra::services::{InventoryFilter, MovementRequest, NewTemplate};
use stockyard_inventory::{ItemSnapshot, MovementKind, StockMovement};
use stockyard_jobs::TemplateTask;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub location: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
    pub item_id: Option<String>,
}

impl InventoryQuery {
    pub fn filter(&self) -> InventoryFilter {
        InventoryFilter {
            location: self.location.clone(),
            low_stock: self.low_stock,
        }
    }
}

/// Body of `POST /stock` and `POST /consume`.
#[derive(Debug, Deserialize)]
pub struct MovementBody {
    pub item_id: String,
    pub quantity: i64,
    pub note: Option<String>,
    pub request_id: Option<Uuid>,
    pub job_id: Option<JobId>,
}

impl From<MovementBody> for MovementRequest {
    fn from(body: MovementBody) -> Self {
        MovementRequest {
            item_id: body.item_id,
            quantity: body.quantity,
            note: body.note,
            request_id: body.request_id,
            job_id: body.job_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateBody {
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<TemplateTask>,
}

impl From<CreateTemplateBody> for NewTemplate {
    fn from(body: CreateTemplateBody) -> Self {
        NewTemplate {
            name: body.name,
            description: body.description,
            tasks: body.tasks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub id: Option<TemplateId>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub job_id: Option<JobId>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlBody {
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FileStatusQuery {
    pub bucket: String,
    pub key: String,
}

/// Query string of a pre-signed `PUT`.
#[derive(Debug, Deserialize)]
pub struct SignedPutQuery {
    pub expires: i64,
    pub signature: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: ItemSnapshot,
    pub low_stock: bool,
}

impl From<ItemSnapshot> for ItemView {
    fn from(item: ItemSnapshot) -> Self {
        let low_stock = item.is_low_stock();
        Self { item, low_stock }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemDetailView {
    #[serde(flatten)]
    pub item: ItemView,
    pub recent_movements: Vec<StockMovement>,
}

#[derive(Debug, Serialize)]
pub struct MovementView {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: i64,
    /// Item quantity right after this movement was applied.
    pub quantity_after: i64,
    pub job_id: Option<JobId>,
    pub replayed: bool,
    pub occurred_at: DateTime<Utc>,
}

impl From<MovementReceipt> for MovementView {
    fn from(r: MovementReceipt) -> Self {
        Self {
            event_id: r.movement.event_id,
            item_id: r.movement.item_id,
            kind: r.movement.kind,
            quantity: r.movement.quantity,
            quantity_after: r.quantity,
            job_id: r.movement.job_id,
            replayed: r.replayed,
            occurred_at: r.movement.occurred_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadUrlView {
    pub upload_url: String,
    pub bucket: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PresignedUrl> for UploadUrlView {
    fn from(p: PresignedUrl) -> Self {
        Self {
            upload_url: p.url,
            bucket: p.bucket,
            key: p.key,
            expires_at: p.expires_at,
        }
    }
}
