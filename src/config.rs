use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_radius_km: f64,
    pub candidate_limit: usize,
    pub offer_timeout_secs: u64,
    pub scan_period_secs: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 8080)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_radius_km: parse_or_default("DISPATCH_RADIUS_KM", 10.0)?,
            candidate_limit: parse_or_default("CANDIDATE_LIMIT", 50)?,
            offer_timeout_secs: parse_or_default("OFFER_TIMEOUT_SECS", 20)?,
            scan_period_secs: parse_or_default("SCAN_PERIOD_SECS", 20)?,
            request_timeout_secs: parse_or_default("REQUEST_TIMEOUT_SECS", 10)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
