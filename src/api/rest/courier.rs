use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::api::rest::PageQuery;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courier/orders/accept", post(accept))
        .route("/courier/orders/decline", post(decline))
        .route("/courier/orders/arrived", post(arrived))
        .route("/courier/orders/picked", post(picked))
        .route(
            "/courier/orders/delivered",
            post(delivered).get(delivered_history),
        )
        .route("/courier/orders/cancel", post(cancel))
        .route("/courier/orders/active", get(active_order))
        .route("/courier/availability", post(availability))
        .route("/courier/location", post(location))
}

#[derive(Deserialize)]
struct StatusPayload {
    order_id: Uuid,
    courier_id: Uuid,
}

async fn accept(
    state: State<Arc<AppState>>,
    principal: Principal,
    payload: Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    progress(state, principal, payload, OrderStatus::Accepted).await
}

async fn decline(
    state: State<Arc<AppState>>,
    principal: Principal,
    payload: Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    progress(state, principal, payload, OrderStatus::Declined).await
}

async fn arrived(
    state: State<Arc<AppState>>,
    principal: Principal,
    payload: Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    progress(state, principal, payload, OrderStatus::Arrived).await
}

async fn picked(
    state: State<Arc<AppState>>,
    principal: Principal,
    payload: Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    progress(state, principal, payload, OrderStatus::PickedUp).await
}

async fn delivered(
    state: State<Arc<AppState>>,
    principal: Principal,
    payload: Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    progress(state, principal, payload, OrderStatus::Delivered).await
}

async fn progress(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<StatusPayload>,
    target: OrderStatus,
) -> Result<Json<Order>, AppError> {
    let courier_id = principal.require_courier()?;
    if payload.courier_id != courier_id {
        return Err(AppError::Forbidden(
            "courier_id does not match caller".to_string(),
        ));
    }

    let updated = state
        .lifecycle
        .courier_update(payload.order_id, courier_id, target)
        .await?;

    // A decline immediately triggers the replacement search; the response
    // carries the settled state (assigned elsewhere or exhausted).
    if target == OrderStatus::Declined {
        let outcome = state
            .dispatcher
            .reassign_after_decline(payload.order_id, courier_id)
            .await?;
        return Ok(Json(outcome.order));
    }
    Ok(Json(updated))
}

/// Courier cancel is treated as a decline: release the assignment, then try
/// to hand the order to someone else.
async fn cancel(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    let courier_id = principal.require_courier()?;
    if payload.courier_id != courier_id {
        return Err(AppError::Forbidden(
            "courier_id does not match caller".to_string(),
        ));
    }

    let current = state.store.get_order(payload.order_id)?;
    if matches!(
        current.status,
        OrderStatus::CanceledByCustomer | OrderStatus::CanceledByCourier
    ) {
        return Ok(Json(current));
    }

    state
        .lifecycle
        .courier_release(payload.order_id, courier_id)
        .await?;
    let outcome = state
        .dispatcher
        .reassign_after_decline(payload.order_id, courier_id)
        .await?;
    Ok(Json(outcome.order))
}

async fn active_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Value>, AppError> {
    let courier_id = principal.require_courier()?;
    let order = state.store.active_for_courier(courier_id);
    Ok(Json(json!({ "order": order })))
}

async fn delivered_history(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let courier_id = principal.require_courier()?;
    let (page, limit, offset) = query.bounds();
    let (orders, total) = state.store.list_delivered_for_courier(courier_id, limit, offset);
    Ok(Json(json!({
        "orders": orders,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}

#[derive(Deserialize)]
struct AvailabilityPayload {
    available: bool,
}

async fn availability(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<AvailabilityPayload>,
) -> Result<StatusCode, AppError> {
    let courier_id = principal.require_courier()?;
    state.store.set_availability(courier_id, payload.available)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct LocationPayload {
    courier_id: Option<Uuid>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

async fn location(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<LocationPayload>,
) -> Result<StatusCode, AppError> {
    let courier_id = principal.require_courier()?;
    if payload.courier_id.is_some_and(|claimed| claimed != courier_id) {
        return Err(AppError::Forbidden(
            "courier_id does not match caller".to_string(),
        ));
    }
    state
        .store
        .update_location(courier_id, payload.latitude, payload.longitude)?;
    Ok(StatusCode::NO_CONTENT)
}
