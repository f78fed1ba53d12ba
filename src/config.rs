//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string; unset runs on in-memory storage
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `STORAGE_TIMEOUT_MS` - Bound on one order transaction (default: 5000)
//! - `NATS_URL` - NATS server; unset disables order events
//! - `NATS_SUBJECT_PREFIX` - Event subject prefix (default: storefront)
//! - `COUPON_POLICY` - `ignore` or `reject` (default: ignore)
//! - `NEGATIVE_TOTAL_POLICY` - `reject` or `allow` (default: reject)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::pricing::{CouponPolicy, NegativeTotalPolicy, PricingPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub storage_timeout: Duration,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub pricing: PricingPolicy,
}

impl AppConfig {
    /// Load from the process environment. `.env` is the caller's business.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let timeout_ms: u64 = parse_or(&optional, "STORAGE_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar("STORAGE_TIMEOUT_MS".into(), "must be positive".into()));
        }
        Ok(Self {
            database_url: optional("DATABASE_URL"),
            max_connections: parse_or(&optional, "DATABASE_MAX_CONNECTIONS", 10)?,
            host: parse_or(&optional, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&optional, "PORT", 8083)?,
            storage_timeout: Duration::from_millis(timeout_ms),
            nats_url: optional("NATS_URL"),
            nats_subject_prefix: optional("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "storefront".to_string()),
            pricing: PricingPolicy {
                coupon: parse_or(&optional, "COUPON_POLICY", CouponPolicy::default())?,
                negative_total: parse_or(&optional, "NEGATIVE_TOTAL_POLICY", NegativeTotalPolicy::default())?,
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}
