use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::error::AppError;
use crate::geo::validate_coords;
use crate::models::catalog::{OrderType, VehicleClass};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/order-types", get(list_order_types))
        .route("/vehicle-classes", get(list_vehicle_classes))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub type_id: Uuid,
    pub vehicle_type_id: Uuid,
    pub receiver_phone: String,
    pub pickup_address: String,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub dropoff_address: String,
    pub dropoff_lat: Option<f64>,
    pub dropoff_lng: Option<f64>,
    pub estimated_price_cents: i64,
}

/// Creates the order and dispatches it synchronously; the response tells the
/// customer whether a courier was found right away.
async fn create_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let customer_id = principal.require_customer()?;
    if payload.customer_id != customer_id {
        return Err(AppError::Forbidden(
            "customer_id does not match caller".to_string(),
        ));
    }

    if payload.receiver_phone.trim().is_empty() {
        return Err(AppError::InvalidInput("receiver_phone is required".to_string()));
    }
    if payload.pickup_address.trim().is_empty() {
        return Err(AppError::InvalidInput("pickup_address is required".to_string()));
    }
    if payload.dropoff_address.trim().is_empty() {
        return Err(AppError::InvalidInput("dropoff_address is required".to_string()));
    }
    if payload.estimated_price_cents < 0 {
        return Err(AppError::InvalidInput(
            "estimated_price_cents must not be negative".to_string(),
        ));
    }
    validate_coords(payload.pickup_lat, payload.pickup_lng)?;
    validate_coords(payload.dropoff_lat, payload.dropoff_lng)?;
    if !state.store.order_type_exists(payload.type_id) {
        return Err(AppError::InvalidInput("unknown type_id".to_string()));
    }
    if !state.store.vehicle_class_exists(payload.vehicle_type_id) {
        return Err(AppError::InvalidInput("unknown vehicle_type_id".to_string()));
    }

    let now = Utc::now();
    let created = state.store.create_order(Order {
        id: Uuid::new_v4(),
        customer_id,
        assigned_courier: None,
        type_id: payload.type_id,
        vehicle_class_id: payload.vehicle_type_id,
        receiver_phone: payload.receiver_phone,
        pickup_address: payload.pickup_address,
        pickup_lat: payload.pickup_lat,
        pickup_lng: payload.pickup_lng,
        dropoff_address: payload.dropoff_address,
        dropoff_lat: payload.dropoff_lat,
        dropoff_lng: payload.dropoff_lng,
        estimated_price_cents: payload.estimated_price_cents,
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    })?;

    let outcome = state.dispatcher.assign(created.id).await?;
    let body = match &outcome.courier {
        Some(courier) => json!({
            "order": outcome.order,
            "assigned_courier_id": courier.id,
        }),
        None => json!({
            "order": outcome.order,
            "message": "no available couriers",
        }),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

async fn list_order_types(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Json<Vec<OrderType>> {
    Json(state.store.list_order_types())
}

async fn list_vehicle_classes(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Json<Vec<VehicleClass>> {
    Json(state.store.list_vehicle_classes())
}
