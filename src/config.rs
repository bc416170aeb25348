use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// `compact` or `json`.
    pub log_format: String,
    pub event_buffer_size: usize,
    pub location_queue_size: usize,
    pub availability_queue_size: usize,
    pub dispatch_radius_km: f64,
    pub dispatch_limit: usize,
    pub driver_location_ttl_secs: u64,
    pub default_currency: String,
    pub average_speed_kmh: f64,
    pub lock_backoff_ms: u64,
    pub lock_max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            event_buffer_size: 1024,
            location_queue_size: 10_000,
            availability_queue_size: 1_000,
            dispatch_radius_km: 5.0,
            dispatch_limit: 20,
            driver_location_ttl_secs: 120,
            default_currency: "CUP".to_string(),
            average_speed_kmh: 30.0,
            lock_backoff_ms: 5,
            lock_max_backoff_ms: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            location_queue_size: parse_or_default(
                "LOCATION_QUEUE_SIZE",
                defaults.location_queue_size,
            )?,
            availability_queue_size: parse_or_default(
                "AVAILABILITY_QUEUE_SIZE",
                defaults.availability_queue_size,
            )?,
            dispatch_radius_km: parse_or_default(
                "DISPATCH_RADIUS_KM",
                defaults.dispatch_radius_km,
            )?,
            dispatch_limit: parse_or_default("DISPATCH_LIMIT", defaults.dispatch_limit)?,
            driver_location_ttl_secs: parse_or_default(
                "DRIVER_LOCATION_TTL_SECS",
                defaults.driver_location_ttl_secs,
            )?,
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or(defaults.default_currency),
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            lock_backoff_ms: parse_or_default("LOCK_BACKOFF_MS", defaults.lock_backoff_ms)?,
            lock_max_backoff_ms: parse_or_default(
                "LOCK_MAX_BACKOFF_MS",
                defaults.lock_max_backoff_ms,
            )?,
        };

        if config.average_speed_kmh <= 0.0 {
            return Err(AppError::Internal(
                "invalid AVERAGE_SPEED_KMH: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn driver_location_ttl(&self) -> Duration {
        Duration::from_secs(self.driver_location_ttl_secs)
    }

    pub fn lock_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.lock_backoff_ms.max(1)),
            Duration::from_millis(self.lock_max_backoff_ms.max(self.lock_backoff_ms.max(1))),
        )
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
