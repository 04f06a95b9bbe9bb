use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;

use stockyard_infra::ingest::FileStatus;
use stockyard_infra::services::UploadTarget;

use crate::app::dto::{FileStatusQuery, SignedPutQuery, UploadUrlBody, UploadUrlView};
use crate::app::errors::{ApiError, JsonBody, QueryParams};
use crate::app::services::AppServices;

pub async fn inventory_upload_url(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<UploadUrlBody>,
) -> Result<Json<UploadUrlView>, ApiError> {
    let url = services.uploads.presign(UploadTarget::Inventory, &body.file_name)?;
    Ok(Json(url.into()))
}

pub async fn template_upload_url(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<UploadUrlBody>,
) -> Result<Json<UploadUrlView>, ApiError> {
    let url = services.uploads.presign(UploadTarget::Template, &body.file_name)?;
    Ok(Json(url.into()))
}

/// Target of a pre-signed upload URL.
pub async fn put_blob(
    Extension(services): Extension<Arc<AppServices>>,
    Path((bucket, key)): Path<(String, String)>,
    QueryParams(query): QueryParams<SignedPutQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let meta = services
        .uploads
        .accept_upload(&bucket, &key, query.expires, &query.signature, body)
        .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

pub async fn file_status(
    Extension(services): Extension<Arc<AppServices>>,
    QueryParams(query): QueryParams<FileStatusQuery>,
) -> Result<Json<FileStatus>, ApiError> {
    Ok(Json(services.files.get(&query.bucket, &query.key).await?))
}
