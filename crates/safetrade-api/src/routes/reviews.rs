//! # Review Endpoints
//!
//! Submission runs automated screening and, when the linked trade is
//! completed, verifies the review immediately. Everything else is
//! operator moderation.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use safetrade_state::{NewReview, ReviewStatus, ReviewType};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_id, extract_json, extract_validated_json, require_text, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SubmitReviewRequest {
    #[schema(value_type = String, example = "seller")]
    pub review_type: ReviewType,
    /// 1 to 5.
    pub rating: u8,
    pub comment: String,
}

impl Validate for SubmitReviewRequest {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        if !(1..=5).contains(&self.rating) {
            return Err(("rating", "rating must be between 1 and 5".to_string()));
        }
        require_text("comment", &self.comment)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyReviewRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectReviewRequest {
    pub reason: String,
}

impl Validate for RejectReviewRequest {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        require_text("reason", &self.reason)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VisibilityRequest {
    #[schema(value_type = String, example = "hidden")]
    pub status: ReviewStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions/{id}/reviews", post(submit_review))
        .route("/v1/reviews/{id}", get(get_review))
        .route("/v1/reviews/{id}/verify", post(verify_review))
        .route("/v1/reviews/{id}/auto-verify", post(auto_verify_review))
        .route("/v1/reviews/{id}/reject", post(reject_review))
        .route("/v1/reviews/{id}/flag", post(flag_review))
        .route("/v1/reviews/{id}/visibility", post(set_visibility))
}

/// POST /v1/transactions/{id}/reviews: Rate the counterparty.
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/reviews",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = SubmitReviewRequest,
    responses(
        (status = 201, description = "Review submitted, possibly already approved"),
        (status = 403, description = "Caller is not a party", body = crate::error::ErrorBody),
        (status = 409, description = "Caller already reviewed this trade", body = crate::error::ErrorBody),
        (status = 422, description = "Rating out of range", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn submit_review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<SubmitReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let transaction_id = extract_id(id)?;
    let req = extract_validated_json(body)?;
    let input = NewReview {
        review_type: req.review_type,
        rating: req.rating,
        comment: req.comment,
    };
    let review = state
        .service
        .submit_review(transaction_id, input, &caller.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    get,
    path = "/v1/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review"),
        (status = 404, description = "Unknown review", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn get_review(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.review(id).await?))
}

/// POST /v1/reviews/{id}/verify: Manual approval by an operator.
#[utoipa::path(
    post,
    path = "/v1/reviews/{id}/verify",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = VerifyReviewRequest,
    responses(
        (status = 200, description = "Review approved"),
        (status = 403, description = "Operators only", body = crate::error::ErrorBody),
        (status = 409, description = "Review already moderated", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn verify_review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<VerifyReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let review = state
        .service
        .verify_review(id, req.notes, &caller.actor())
        .await?;
    Ok(Json(review))
}

/// POST /v1/reviews/{id}/auto-verify: Re-run trade-based verification.
#[utoipa::path(
    post,
    path = "/v1/reviews/{id}/auto-verify",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review approved"),
        (status = 409, description = "Review already moderated", body = crate::error::ErrorBody),
        (status = 422, description = "Trade not completed or comment fails screening", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn auto_verify_review(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.auto_verify_review(id).await?))
}

#[utoipa::path(
    post,
    path = "/v1/reviews/{id}/reject",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = RejectReviewRequest,
    responses(
        (status = 200, description = "Review rejected"),
        (status = 403, description = "Operators only", body = crate::error::ErrorBody),
        (status = 409, description = "Review already moderated", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn reject_review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_validated_json(body)?;
    let review = state
        .service
        .reject_review(id, req.reason, &caller.actor())
        .await?;
    Ok(Json(review))
}

/// POST /v1/reviews/{id}/flag: Report a review. Each user may flag once.
#[utoipa::path(
    post,
    path = "/v1/reviews/{id}/flag",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Flag recorded"),
        (status = 409, description = "Caller already flagged this review", body = crate::error::ErrorBody),
        (status = 422, description = "Caller has no user id", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn flag_review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.flag_review(id, &caller.actor()).await?))
}

#[utoipa::path(
    post,
    path = "/v1/reviews/{id}/visibility",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Visibility updated"),
        (status = 403, description = "Only the reviewer or an operator", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
pub(crate) async fn set_visibility(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<VisibilityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let review = state
        .service
        .set_review_visibility(id, req.status, &caller.actor())
        .await?;
    Ok(Json(review))
}
