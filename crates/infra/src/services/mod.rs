//! Domain handlers: the request/response units behind the HTTP routes.
//!
//! Each service validates its input before writing anything and reports
//! failures as [`ServiceError`].

pub mod error;
pub mod history;
pub mod inventory;
pub mod jobs;
pub mod templates;
pub mod uploads;

pub use error::{ServiceError, ServiceResult};
pub use history::{DEFAULT_HISTORY_LIMIT, HistoryService, MAX_HISTORY_LIMIT};
pub use inventory::{InventoryFilter, InventoryService, MovementRequest, RECENT_MOVEMENTS};
pub use jobs::{JobCreated, JobService, ReconcileReport, SYNC_LEASE_SECS};
pub use templates::{NewTemplate, TemplateService};
pub use uploads::{FileStatusService, UploadService, UploadTarget};
