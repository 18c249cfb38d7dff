use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, validate_coords, GeoPoint};
use crate::models::courier::Courier;
use crate::store::{touch, MemoryStore};

impl MemoryStore {
    /// Courier rows are created by the external sign-up flow; this is the
    /// ingestion point for them (and for tests).
    pub fn insert_courier(&self, courier: Courier) -> Courier {
        self.couriers.insert(courier.id, courier.clone());
        courier
    }

    pub fn get_courier(&self, id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    pub fn set_availability(&self, id: Uuid, available: bool) -> Result<(), AppError> {
        let mut entry = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;
        let courier = entry.value_mut();
        courier.available = available;
        touch(&mut courier.updated_at);
        Ok(())
    }

    pub fn update_location(
        &self,
        id: Uuid,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<(), AppError> {
        validate_coords(lat, lng)?;
        let mut entry = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;
        let courier = entry.value_mut();
        courier.latitude = lat;
        courier.longitude = lng;
        touch(&mut courier.updated_at);
        Ok(())
    }

    /// Admin soft-retire; a retired courier is never selected.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), AppError> {
        let mut entry = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;
        let courier = entry.value_mut();
        courier.active = active;
        touch(&mut courier.updated_at);
        Ok(())
    }

    /// K-nearest available couriers: available, active, located, within
    /// `radius_km` of `center`, and not tied to any non-terminal order.
    /// Ordered by ascending great-circle distance, ties broken by earlier
    /// `updated_at`; the limit applies after ordering.
    pub fn nearest_available(&self, center: GeoPoint, radius_km: f64, limit: usize) -> Vec<Courier> {
        let busy: HashSet<Uuid> = self
            .orders
            .iter()
            .filter(|entry| entry.value().status.occupies_courier())
            .filter_map(|entry| entry.value().assigned_courier)
            .collect();

        let mut ranked: Vec<(f64, Courier)> = self
            .couriers
            .iter()
            .filter_map(|entry| {
                let courier = entry.value();
                if !courier.available || !courier.active || busy.contains(&courier.id) {
                    return None;
                }
                let location = courier.location()?;
                let distance = haversine_km(&center, &location);
                (distance <= radius_km).then(|| (distance, courier.clone()))
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.updated_at.cmp(&b.1.updated_at))
        });
        ranked.truncate(limit);
        ranked.into_iter().map(|(_, courier)| courier).collect()
    }
}
