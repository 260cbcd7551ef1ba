//! # Request Extraction
//!
//! Handlers take `Result<Json<T>, JsonRejection>` and `Result<Path<Uuid>,
//! PathRejection>` and run them through these helpers, so malformed input
//! becomes a structured 400 rather than axum's plain-text rejection.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;
use uuid::Uuid;

use crate::error::AppError;

/// Business rules a request DTO checks before it reaches the domain.
pub trait Validate {
    /// Returns `(field, message)` for the first violated rule.
    fn validate(&self) -> Result<(), (&'static str, String)>;
}

pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value
        .validate()
        .map_err(|(field, message)| AppError::validation(field, message))?;
    Ok(value)
}

pub fn extract_id(result: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    result
        .map(|Path(id)| id)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Rejects blank text.
pub fn require_text(field: &'static str, value: &str) -> Result<(), (&'static str, String)> {
    if value.trim().is_empty() {
        Err((field, format!("{field} must not be blank")))
    } else {
        Ok(())
    }
}
