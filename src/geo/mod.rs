use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Checks an optional coordinate pair against valid lat/lng ranges.
/// Both-or-neither is allowed; a lone latitude or longitude is not.
pub fn validate_coords(lat: Option<f64>, lng: Option<f64>) -> Result<(), AppError> {
    match (lat, lng) {
        (None, None) => Ok(()),
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(AppError::InvalidInput(format!(
                    "latitude {lat} out of range [-90, 90]"
                )));
            }
            if !(-180.0..=180.0).contains(&lng) {
                return Err(AppError::InvalidInput(format!(
                    "longitude {lng} out of range [-180, 180]"
                )));
            }
            Ok(())
        }
        _ => Err(AppError::InvalidInput(
            "latitude and longitude must be provided together".to_string(),
        )),
    }
}
