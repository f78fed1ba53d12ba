//! Storefront Orders
//!
//! Multi-tenant storefront backend: every store publishes a catalog of
//! products, delivery zones and coupons, and takes orders against it.
//!
//! ## Features
//! - Catalog management per store
//! - Transactional order creation with stock enforcement
//! - Delivery zone fees with free-delivery thresholds
//! - Percentage coupons with minimum totals
//! - Daily and weekly order stats

pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod services;
pub mod storage;

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Failures of the storage layer. Never retried internally.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("unit of work misuse: {0}")]
    ScopeViolation(String),

    #[cfg(test)]
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("insufficient stock for {0}")]
    InsufficientStock(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OrderError {
    /// Storage failures are transient; everything else is the caller's to fix.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Storage(_)) }
}

pub type Result<T> = std::result::Result<T, OrderError>;
