use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app::dto::{CreateTemplateBody, TemplateQuery};
use crate::app::errors::{ApiError, JsonBody, QueryParams};
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// `GET /job-templates`: headers of all templates, or one template by `id` with its tasks.
pub async fn get_templates(
    Extension(services): Extension<Arc<AppServices>>,
    QueryParams(query): QueryParams<TemplateQuery>,
) -> Result<Response, ApiError> {
    match query.id {
        Some(id) => Ok(Json(services.templates.get(id).await?).into_response()),
        None => {
            let templates = services.templates.list().await?;
            Ok(Json(serde_json::json!({ "templates": templates })).into_response())
        }
    }
}

pub async fn create_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    JsonBody(body): JsonBody<CreateTemplateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let template = services.templates.create(body.into(), caller.actor()).await?;
    Ok((StatusCode::CREATED, Json(template)))
}
