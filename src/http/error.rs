//! Error to response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::{OrderError, StorageError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// Storage did not answer in time; the caller may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(StorageError),

    #[error("storage error: {0}")]
    Internal(StorageError),
}

impl ApiError {
    pub fn not_found(what: impl std::fmt::Display) -> Self { Self::NotFound(format!("not found: {what}")) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Conflict(reason) => Self::Conflict(reason),
            timeout @ StorageError::Timeout(_) => Self::Unavailable(timeout),
            other => Self::Internal(other),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(error: OrderError) -> Self {
        match error {
            e @ OrderError::NotFound(_) => Self::NotFound(e.to_string()),
            OrderError::Validation(reason) => Self::BadRequest(reason),
            e @ OrderError::InsufficientStock(_) => Self::BadRequest(e.to_string()),
            OrderError::Storage(storage) => storage.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self { Self::BadRequest(errors.to_string()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage details stay in the logs.
        let detail = match &self {
            Self::Unavailable(e) => {
                tracing::error!(error = %e, "request failed");
                "storage unavailable, retry later".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_order_errors_map_to_status() {
        let status = |e: OrderError| ApiError::from(e).status();
        assert_eq!(status(OrderError::NotFound("store 'x'".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(OrderError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(OrderError::InsufficientStock("A".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(OrderError::Storage(StorageError::Timeout(Duration::from_secs(1)))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(OrderError::Storage(StorageError::DataCorruption("status".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_conflict_keeps_reason() {
        let err = ApiError::from(StorageError::Conflict("slug 'demo' is taken".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "slug 'demo' is taken");
    }

    #[test]
    fn test_insufficient_stock_names_product() {
        let err = ApiError::from(OrderError::InsufficientStock("A".into()));
        assert_eq!(err.to_string(), "insufficient stock for A");
    }
}
