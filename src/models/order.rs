use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    Accepted,
    Declined,
    Arrived,
    PickedUp,
    Delivered,
    NoNearbyDriver,
    CanceledByCustomer,
    CanceledByCourier,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::NoNearbyDriver
                | OrderStatus::CanceledByCustomer
                | OrderStatus::CanceledByCourier
        )
    }

    /// Statuses in which the assigned courier is tied up and must not be
    /// offered another order.
    pub fn occupies_courier(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::Accepted
                | OrderStatus::Arrived
                | OrderStatus::PickedUp
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Declined => "declined",
            OrderStatus::Arrived => "arrived",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::NoNearbyDriver => "no_nearby_driver",
            OrderStatus::CanceledByCustomer => "canceled_by_customer",
            OrderStatus::CanceledByCourier => "canceled_by_courier",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_courier: Option<Uuid>,
    pub type_id: Uuid,
    pub vehicle_class_id: Uuid,
    pub receiver_phone: String,
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
    pub estimated_price_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn pickup_point(&self) -> Option<GeoPoint> {
        match (self.pickup_lat, self.pickup_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn status_serializes_to_stable_lowercase_strings() {
        for (status, wire) in [
            (OrderStatus::Pending, "pending"),
            (OrderStatus::Assigned, "assigned"),
            (OrderStatus::Accepted, "accepted"),
            (OrderStatus::Declined, "declined"),
            (OrderStatus::Arrived, "arrived"),
            (OrderStatus::PickedUp, "picked_up"),
            (OrderStatus::Delivered, "delivered"),
            (OrderStatus::NoNearbyDriver, "no_nearby_driver"),
            (OrderStatus::CanceledByCustomer, "canceled_by_customer"),
            (OrderStatus::CanceledByCourier, "canceled_by_courier"),
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), wire);
            assert_eq!(status.as_str(), wire);
        }
    }

    #[test]
    fn terminal_set_matches_lifecycle() {
        let terminal = [
            OrderStatus::Delivered,
            OrderStatus::NoNearbyDriver,
            OrderStatus::CanceledByCustomer,
            OrderStatus::CanceledByCourier,
        ];
        for status in terminal {
            assert!(status.is_terminal());
            assert!(!status.occupies_courier());
        }
        for status in [
            OrderStatus::Pending,
            OrderStatus::Assigned,
            OrderStatus::Accepted,
            OrderStatus::Declined,
            OrderStatus::Arrived,
            OrderStatus::PickedUp,
        ] {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn courier_is_occupied_while_engaged() {
        assert!(OrderStatus::Assigned.occupies_courier());
        assert!(OrderStatus::Accepted.occupies_courier());
        assert!(OrderStatus::Arrived.occupies_courier());
        assert!(OrderStatus::PickedUp.occupies_courier());
        assert!(!OrderStatus::Pending.occupies_courier());
        assert!(!OrderStatus::Declined.occupies_courier());
    }
}
