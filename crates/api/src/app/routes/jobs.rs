use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use stockyard_infra::services::{JobCreated, ReconcileReport};
use stockyard_jobs::{JobHistoryEntry, NewJob};

use crate::app::dto::HistoryQuery;
use crate::app::errors::{ApiError, JsonBody, QueryParams};
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// `POST /jobs`: 201 once WFM has the job, 202 while it is still pending.
pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    JsonBody(body): JsonBody<NewJob>,
) -> Result<impl IntoResponse, ApiError> {
    let created: JobCreated = services.jobs.create(body, caller.actor()).await?;
    let status = if created.synced {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(created)))
}

pub async fn reconcile_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(services.jobs.reconcile(caller.actor()).await?))
}

/// `GET /job-history`: one job oldest first, or everything newest first.
pub async fn job_history(
    Extension(services): Extension<Arc<AppServices>>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries: Vec<JobHistoryEntry> = match query.job_id {
        Some(job_id) => services.history.for_job(job_id).await?,
        None => services.history.recent(query.limit).await?,
    };
    Ok(Json(serde_json::json!({ "entries": entries })))
}
