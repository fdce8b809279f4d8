//! Error types for mss-intake

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::admission::AdmissionError;

/// Seconds clients are asked to wait after a 503
const RETRY_AFTER_SECS: &str = "1";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid tenant identification (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409) - e.g. finalizing an abandoned placeholder
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage temporarily unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidContext(_) => ApiError::BadRequest(err.to_string()),
            AdmissionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AdmissionError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            AdmissionError::StorageUnavailable(_) => ApiError::Unavailable(err.to_string()),
            AdmissionError::Storage(_) | AdmissionError::Internal(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response();
        }
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
