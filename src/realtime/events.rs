use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus};

pub const ORDER_ASSIGNED: &str = "order.assigned";
pub const ORDER_STATUS: &str = "order.status";
pub const ORDER_ASSIGNMENT_TIMED_OUT: &str = "order.assignment_timed_out";
pub const ORDER_REASSIGNED_AWAY: &str = "order.reassigned_away";
pub const ORDER_NO_NEARBY_DRIVER: &str = "order.no_nearby_driver";
pub const ORDER_SYNC: &str = "order.sync";
pub const LOCATION_UPDATE: &str = "location.update";

/// Full order details pushed to the courier receiving an offer.
#[derive(Debug, Clone, Serialize)]
pub struct OfferPayload {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub pickup_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_lng: Option<f64>,
    pub dropoff_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_lng: Option<f64>,
    pub receiver_phone: String,
    pub estimated_price_cents: i64,
}

impl OfferPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            pickup_address: order.pickup_address.clone(),
            pickup_lat: order.pickup_lat,
            pickup_lng: order.pickup_lng,
            dropoff_address: order.dropoff_address.clone(),
            dropoff_lat: order.dropoff_lat,
            dropoff_lng: order.dropoff_lng,
            receiver_phone: order.receiver_phone.clone(),
            estimated_price_cents: order.estimated_price_cents,
        }
    }
}

/// Status-change event for customers (and, on cancellation, couriers).
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusPayload {
    pub order_id: Uuid,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_lng: Option<f64>,
}

impl OrderStatusPayload {
    pub fn brief(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            courier_id: order.assigned_courier,
            pickup_address: None,
            pickup_lat: None,
            pickup_lng: None,
            dropoff_address: None,
            dropoff_lat: None,
            dropoff_lng: None,
        }
    }

    pub fn detailed(order: &Order) -> Self {
        Self {
            pickup_address: Some(order.pickup_address.clone()),
            pickup_lat: order.pickup_lat,
            pickup_lng: order.pickup_lng,
            dropoff_address: Some(order.dropoff_address.clone()),
            dropoff_lat: order.dropoff_lat,
            dropoff_lng: order.dropoff_lng,
            ..Self::brief(order)
        }
    }
}

/// Minimal reference sent to a courier losing an offer (timeout, reassigned
/// away, exhausted).
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentPayload {
    pub order_id: Uuid,
    pub customer_id: Uuid,
}

impl AssignmentPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
        }
    }
}

/// Snapshot of a customer's active orders, pushed once on socket attach.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncPayload {
    pub orders: Vec<Order>,
}

/// Inbound frame shape on any socket: `{event, data}`.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
