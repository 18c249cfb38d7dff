use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::api::rest::PageQuery;
use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customer/orders/cancel", post(cancel))
        .route("/customer/orders/active", get(active_orders))
        .route("/customer/orders/history", get(history))
}

#[derive(Deserialize)]
struct CancelPayload {
    order_id: Uuid,
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<CancelPayload>,
) -> Result<Json<Order>, AppError> {
    let customer_id = principal.require_customer()?;
    let updated = state
        .lifecycle
        .cancel_by_customer(payload.order_id, customer_id)
        .await?;
    Ok(Json(updated))
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Value>, AppError> {
    let customer_id = principal.require_customer()?;
    let orders = state.store.list_active_for_customer(customer_id);
    Ok(Json(json!({ "orders": orders })))
}

async fn history(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let customer_id = principal.require_customer()?;
    let (page, limit, offset) = query.bounds();
    let (orders, total) = state
        .store
        .list_history_for_customer(customer_id, limit, offset);
    Ok(Json(json!({
        "orders": orders,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}
