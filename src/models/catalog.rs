use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configurable classifier for orders (e.g. document, goods, food).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderType {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

/// Vehicle classifier selected at order creation and used to validate
/// requests against the seeded reference table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleClass {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub active: bool,
}
