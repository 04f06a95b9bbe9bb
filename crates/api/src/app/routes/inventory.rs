use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::dto::{self, InventoryQuery, ItemDetailView, ItemView, MovementView};
use crate::app::errors::{ApiError, JsonBody, QueryParams};
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// `GET /inventory`: all items, or one item with its recent movements.
pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    QueryParams(query): QueryParams<InventoryQuery>,
) -> Result<axum::response::Response, ApiError> {
    if let Some(item_id) = &query.item_id {
        let (item, recent_movements) = services.inventory.item(item_id).await?;
        return Ok(Json(ItemDetailView {
            item: item.into(),
            recent_movements,
        })
        .into_response());
    }

    let items: Vec<ItemView> = services
        .inventory
        .list(&query.filter())
        .await?
        .into_iter()
        .map(ItemView::from)
        .collect();
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn record_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    JsonBody(body): JsonBody<dto::MovementBody>,
) -> Result<Json<MovementView>, ApiError> {
    let receipt = services.inventory.stock(body.into(), caller.actor()).await?;
    Ok(Json(receipt.into()))
}

pub async fn record_consumption(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    JsonBody(body): JsonBody<dto::MovementBody>,
) -> Result<Json<MovementView>, ApiError> {
    let receipt = services.inventory.consume(body.into(), caller.actor()).await?;
    Ok(Json(receipt.into()))
}
