use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use domain::Order;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// Exact `order_uid` to look up alongside the page.
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Arc<Order>>,
    pub found: Option<Arc<Order>>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

/// Browse cached orders sorted by order_uid, optionally searching for one
pub async fn list_orders_handler(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<OrderListResponse>, (StatusCode, String)> {
    // Validate pagination params
    if params.limit < 1 || params.limit > 100 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Limit must be between 1 and 100".to_string(),
        ));
    }

    if params.offset < 0 {
        return Err((StatusCode::BAD_REQUEST, "Offset must be >= 0".to_string()));
    }

    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let found = match query {
        Some(order_uid) => state.cache.get(order_uid).await,
        None => None,
    };

    let mut orders = state.cache.list().await;
    orders.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
    let total = orders.len();

    let page: Vec<Arc<Order>> = orders
        .into_iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .collect();

    info!(
        total,
        returned = page.len(),
        query = ?query,
        found = found.is_some(),
        "Listed cached orders"
    );

    Ok(Json(OrderListResponse {
        orders: page,
        found,
        total,
        limit: params.limit,
        offset: params.offset,
    }))
}
