//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`LifecycleError`] to HTTP status codes and a JSON body carrying a
//! machine-readable code, a message and, for validation errors, the field.
//! Internal error details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use safetrade_core::LifecycleError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INVALID_TRANSITION").
    pub code: String,
    pub message: String,
    /// Present for validation errors: `{"field": "..."}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// A field failed a business rule (422).
    #[error("validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Malformed body, path or header (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Role may not perform the action (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested status change is not in the allowed set (409).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Concurrent modification or duplicate (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// A dependency is down (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let details = match &self {
            Self::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound { .. } => Self::NotFound(err.to_string()),
            LifecycleError::ValidationFailure { field, message } => Self::Validation {
                field: Some(field),
                message,
            },
            LifecycleError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            LifecycleError::Conflict { .. } => Self::Conflict(err.to_string()),
            LifecycleError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            LifecycleError::Storage(msg) => Self::Internal(msg),
        }
    }
}
