use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub active: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    /// A new courier starts active but unavailable with no known location;
    /// it becomes dispatchable once it reports availability and coordinates.
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            active: true,
            available: false,
            latitude: None,
            longitude: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}
