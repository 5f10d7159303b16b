use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub bus_backend: String,
    pub relay_url: String,
    pub distance_backend: String,
    pub routing_url: String,
    pub search_radius_km: f64,
    pub activator_interval_secs: u64,
    pub connection_buffer: usize,
    pub send_timeout_ms: u64,
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            bus_backend: env::var("BUS_BACKEND").unwrap_or_else(|_| "registry".to_string()),
            relay_url: env::var("RELAY_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            distance_backend: env::var("DISTANCE_BACKEND")
                .unwrap_or_else(|_| "great_circle".to_string()),
            routing_url: env::var("ROUTING_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 5.0)?,
            activator_interval_secs: parse_or_default("ACTIVATOR_INTERVAL_SECS", 60)?,
            connection_buffer: parse_or_default("CONNECTION_BUFFER", 32)?,
            send_timeout_ms: parse_or_default("SEND_TIMEOUT_MS", 1000)?,
            peak_start_hour: parse_or_default("PEAK_START_HOUR", 18)?,
            peak_end_hour: parse_or_default("PEAK_END_HOUR", 21)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Validation(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
