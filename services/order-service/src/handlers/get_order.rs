use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::Order;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// Get a single order by its order_uid
pub async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Arc<Order>>, (StatusCode, String)> {
    match state.cache.get(&order_uid).await {
        Some(order) => {
            info!(order_uid = %order_uid, "Order served from cache");
            Ok(Json(order))
        }
        None => {
            info!(order_uid = %order_uid, "Order not found");
            Err((StatusCode::NOT_FOUND, format!("Order not found: {}", order_uid)))
        }
    }
}
