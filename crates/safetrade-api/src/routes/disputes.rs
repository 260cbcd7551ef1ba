//! # Dispute Endpoints
//!
//! Filing a dispute freezes the transaction in `disputed`. A terminal
//! dispute transition settles the transaction before the dispute commits,
//! so a failed settlement leaves both records unchanged.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use safetrade_core::TransactionId;
use safetrade_state::{DisputeCommand, DisputeStatus, DisputeType, NewDispute, ResolutionType};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{
    extract_id, extract_json, extract_query, extract_validated_json, require_text, Validate,
};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct FileDisputeRequest {
    #[schema(value_type = String, example = "vehicle_condition")]
    pub dispute_type: DisputeType,
    pub reason: String,
    pub description: String,
}

impl Validate for FileDisputeRequest {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        require_text("reason", &self.reason)?;
        require_text("description", &self.description)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DisputeTransitionRequest {
    #[schema(value_type = String, example = "investigating")]
    pub to: DisputeStatus,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub resolution_type: Option<ResolutionType>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ResolveDisputeRequest {
    #[schema(value_type = String, example = "refund_full")]
    pub resolution_type: ResolutionType,
    pub resolution: String,
}

impl Validate for ResolveDisputeRequest {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        require_text("resolution", &self.resolution)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DisputeResponseRequest {
    pub response: String,
}

impl Validate for DisputeResponseRequest {
    fn validate(&self) -> Result<(), (&'static str, String)> {
        require_text("response", &self.response)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDisputesQuery {
    pub transaction_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions/{id}/disputes", post(file_dispute))
        .route("/v1/disputes", get(list_disputes))
        .route("/v1/disputes/{id}", get(get_dispute))
        .route("/v1/disputes/{id}/transition", post(transition_dispute))
        .route("/v1/disputes/{id}/resolve", post(resolve_dispute))
        .route("/v1/disputes/{id}/responses", post(respond_to_dispute))
}

/// POST /v1/transactions/{id}/disputes: File a complaint as a party.
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/disputes",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = FileDisputeRequest,
    responses(
        (status = 201, description = "Dispute filed, transaction frozen"),
        (status = 403, description = "Caller is not a party", body = crate::error::ErrorBody),
        (status = 409, description = "An open dispute already exists", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn file_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<FileDisputeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let transaction_id = extract_id(id)?;
    let req = extract_validated_json(body)?;
    let input = NewDispute {
        dispute_type: req.dispute_type,
        reason: req.reason,
        description: req.description,
    };
    let dispute = state
        .service
        .file_dispute(transaction_id, input, &caller.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

#[utoipa::path(
    get,
    path = "/v1/disputes",
    params(ListDisputesQuery),
    responses((status = 200, description = "Disputes, newest first")),
    tag = "disputes"
)]
pub(crate) async fn list_disputes(
    State(state): State<AppState>,
    query: Result<Query<ListDisputesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let query = extract_query(query)?;
    let disputes = state
        .service
        .list_disputes(query.transaction_id.map(TransactionId::from_uuid))
        .await?;
    Ok(Json(disputes))
}

#[utoipa::path(
    get,
    path = "/v1/disputes/{id}",
    params(("id" = Uuid, Path, description = "Dispute id")),
    responses(
        (status = 200, description = "Dispute"),
        (status = 404, description = "Unknown dispute", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn get_dispute(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.dispute(id).await?))
}

/// POST /v1/disputes/{id}/transition: Operator moves the case along.
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/transition",
    params(("id" = Uuid, Path, description = "Dispute id")),
    request_body = DisputeTransitionRequest,
    responses(
        (status = 200, description = "Transition committed"),
        (status = 403, description = "Operators only", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or concurrent modification", body = crate::error::ErrorBody),
        (status = 422, description = "Resolution details missing", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn transition_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DisputeTransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let cmd = DisputeCommand {
        to: Some(req.to),
        resolution_type: req.resolution_type,
        resolution: req.resolution,
        admin_notes: req.admin_notes,
    };
    let dispute = state
        .service
        .transition_dispute(id, cmd, &caller.actor())
        .await?;
    Ok(Json(dispute))
}

/// POST /v1/disputes/{id}/resolve: Shorthand for a transition to `resolved`.
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/resolve",
    params(("id" = Uuid, Path, description = "Dispute id")),
    request_body = ResolveDisputeRequest,
    responses(
        (status = 200, description = "Dispute resolved and transaction settled"),
        (status = 403, description = "Operators only", body = crate::error::ErrorBody),
        (status = 409, description = "Dispute cannot be resolved from its current status", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn resolve_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ResolveDisputeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_validated_json(body)?;
    let dispute = state
        .service
        .resolve_dispute(id, req.resolution_type, req.resolution, &caller.actor())
        .await?;
    Ok(Json(dispute))
}

/// POST /v1/disputes/{id}/responses: A party's statement. Replaces any earlier one.
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/responses",
    params(("id" = Uuid, Path, description = "Dispute id")),
    request_body = DisputeResponseRequest,
    responses(
        (status = 200, description = "Response recorded"),
        (status = 403, description = "Caller is not a party", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn respond_to_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DisputeResponseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_validated_json(body)?;
    let dispute = state
        .service
        .respond_to_dispute(id, req.response, &caller.actor())
        .await?;
    Ok(Json(dispute))
}
