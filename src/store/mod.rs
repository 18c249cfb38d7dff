pub mod couriers;
pub mod orders;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::catalog::{OrderType, VehicleClass};
use crate::models::courier::Courier;
use crate::models::order::Order;

/// One exclusion-memory entry: this courier has been offered this order.
#[derive(Debug, Clone)]
pub struct AssignmentAttempt {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub created_at: chrono::DateTime<Utc>,
}

/// In-process store backing the order and courier contracts. Per-entity
/// mutations run under the map entry's exclusive guard, which is what makes
/// compound updates such as `mark_exhausted` atomic.
pub struct MemoryStore {
    pub(crate) orders: DashMap<Uuid, Order>,
    pub(crate) couriers: DashMap<Uuid, Courier>,
    pub(crate) attempts: DashMap<Uuid, Vec<AssignmentAttempt>>,
    order_types: Vec<OrderType>,
    vehicle_classes: Vec<VehicleClass>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            couriers: DashMap::new(),
            attempts: DashMap::new(),
            order_types: seed_order_types(),
            vehicle_classes: seed_vehicle_classes(),
        }
    }

    pub fn list_order_types(&self) -> Vec<OrderType> {
        self.order_types.iter().filter(|t| t.active).cloned().collect()
    }

    pub fn list_vehicle_classes(&self) -> Vec<VehicleClass> {
        self.vehicle_classes.iter().filter(|v| v.active).cloned().collect()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn courier_count(&self) -> usize {
        self.couriers.len()
    }

    pub fn order_type_exists(&self, id: Uuid) -> bool {
        self.order_types.iter().any(|t| t.id == id && t.active)
    }

    pub fn vehicle_class_exists(&self, id: Uuid) -> bool {
        self.vehicle_classes.iter().any(|v| v.id == id && v.active)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Bumps `updated_at` so it strictly increases even when two mutations land
/// within the clock's resolution.
pub(crate) fn touch(updated_at: &mut chrono::DateTime<Utc>) {
    let now = Utc::now();
    *updated_at = if now > *updated_at {
        now
    } else {
        *updated_at + Duration::microseconds(1)
    };
}

fn seed_order_types() -> Vec<OrderType> {
    ["document", "goods", "food"]
        .iter()
        .map(|name| OrderType {
            id: Uuid::new_v4(),
            name: (*name).to_string(),
            active: true,
        })
        .collect()
}

fn seed_vehicle_classes() -> Vec<VehicleClass> {
    [
        ("bike", "Bicycle"),
        ("motorbike", "Motorbike"),
        ("car", "Car"),
    ]
    .iter()
    .map(|(code, name)| VehicleClass {
        id: Uuid::new_v4(),
        code: (*code).to_string(),
        name: (*name).to_string(),
        active: true,
    })
    .collect()
}
