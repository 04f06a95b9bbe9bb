use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

pub mod inventory;
pub mod jobs;
pub mod system;
pub mod templates;
pub mod uploads;

/// Largest file accepted through a pre-signed upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router() -> Router {
    Router::new()
        .route("/inventory", get(inventory::list_inventory))
        .route("/stock", post(inventory::record_stock))
        .route("/consume", post(inventory::record_consumption))
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/reconcile", post(jobs::reconcile_jobs))
        .route("/job-history", get(jobs::job_history))
        .route(
            "/job-templates",
            get(templates::get_templates).post(templates::create_template),
        )
        .route("/upload-url", post(uploads::inventory_upload_url))
        .route("/job-template-upload-url", post(uploads::template_upload_url))
        .route("/file-status", get(uploads::file_status))
        .route(
            "/blobs/:bucket/*key",
            put(uploads::put_blob).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}
