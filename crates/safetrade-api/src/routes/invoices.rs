//! # Invoice Endpoints
//!
//! Amounts are derived server-side. Clients send the net amount and an
//! optional VAT percentage; `vat_amount` and `total_amount` are never
//! accepted as input.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use safetrade_core::{Timestamp, TransactionId};
use safetrade_state::{derive_amounts, validate_amounts, InvoiceCommand, InvoiceStatus, NewInvoice};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_id, extract_json};
use crate::state::AppState;

// ─── DTOs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateInvoiceRequest {
    #[schema(value_type = String, example = "1000.00")]
    pub amount: Decimal,
    /// Defaults to the configured VAT rate.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "19")]
    pub vat_percentage: Option<Decimal>,
    /// RFC 3339 UTC timestamp. Defaults to 14 days after issue.
    #[serde(default)]
    #[schema(example = "2026-11-01T00:00:00Z")]
    pub due_date: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RepriceInvoiceRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub vat_percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InvoiceTransitionRequest {
    #[schema(value_type = String, example = "sent")]
    pub to: InvoiceStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DeriveRequest {
    #[schema(value_type = String, example = "1000.00")]
    pub amount: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub vat_percentage: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeriveResponse {
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub vat_percentage: Decimal,
    #[schema(value_type = String)]
    pub vat_amount: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/transactions/{id}/invoices",
            post(create_invoice).get(list_invoices),
        )
        .route("/v1/invoices/derive", post(derive))
        .route("/v1/invoices/{id}", get(get_invoice))
        .route("/v1/invoices/{id}/amounts", put(reprice_invoice))
        .route("/v1/invoices/{id}/transition", post(transition_invoice))
}

// ─── Handlers ────────────────────────────────────────────────────────

/// POST /v1/transactions/{id}/invoices: Issue a draft invoice with the next number.
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/invoices",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Draft invoice"),
        (status = 403, description = "Caller may not invoice this trade", body = crate::error::ErrorBody),
        (status = 422, description = "Amount, VAT or due date invalid", body = crate::error::ErrorBody),
    ),
    tag = "invoices"
)]
pub(crate) async fn create_invoice(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let transaction_id = extract_id(id)?;
    let req = extract_json(body)?;
    let due_date = req
        .due_date
        .as_deref()
        .map(Timestamp::parse)
        .transpose()
        .map_err(|e| AppError::validation("due_date", e.to_string()))?;
    let input = NewInvoice {
        amount: req.amount,
        vat_percentage: req.vat_percentage,
        due_date,
    };
    let invoice = state
        .service
        .create_invoice(transaction_id, input, &caller.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{id}/invoices",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses((status = 200, description = "Invoices for the transaction")),
    tag = "invoices"
)]
pub(crate) async fn list_invoices(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let transaction_id = TransactionId::from_uuid(extract_id(id)?);
    Ok(Json(state.service.list_invoices(transaction_id).await?))
}

#[utoipa::path(
    get,
    path = "/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice"),
        (status = 404, description = "Unknown invoice", body = crate::error::ErrorBody),
    ),
    tag = "invoices"
)]
pub(crate) async fn get_invoice(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.invoice(id).await?))
}

/// PUT /v1/invoices/{id}/amounts: Change amount or VAT on a draft; totals are re-derived.
#[utoipa::path(
    put,
    path = "/v1/invoices/{id}/amounts",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = RepriceInvoiceRequest,
    responses(
        (status = 200, description = "Invoice repriced"),
        (status = 409, description = "Concurrent modification", body = crate::error::ErrorBody),
        (status = 422, description = "Invoice is no longer a draft", body = crate::error::ErrorBody),
    ),
    tag = "invoices"
)]
pub(crate) async fn reprice_invoice(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RepriceInvoiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let invoice = state
        .service
        .reprice_invoice(id, req.amount, req.vat_percentage, &caller.actor())
        .await?;
    Ok(Json(invoice))
}

#[utoipa::path(
    post,
    path = "/v1/invoices/{id}/transition",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = InvoiceTransitionRequest,
    responses(
        (status = 200, description = "Transition committed"),
        (status = 403, description = "Role may not take this edge", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or concurrent modification", body = crate::error::ErrorBody),
    ),
    tag = "invoices"
)]
pub(crate) async fn transition_invoice(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<InvoiceTransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let cmd = InvoiceCommand {
        to: req.to,
        notes: req.notes,
    };
    let invoice = state
        .service
        .transition_invoice(id, cmd, &caller.actor())
        .await?;
    Ok(Json(invoice))
}

/// POST /v1/invoices/derive: Preview VAT and total without persisting.
#[utoipa::path(
    post,
    path = "/v1/invoices/derive",
    request_body = DeriveRequest,
    responses(
        (status = 200, description = "Derived amounts", body = DeriveResponse),
        (status = 422, description = "Amount or VAT out of range", body = crate::error::ErrorBody),
    ),
    tag = "invoices"
)]
pub(crate) async fn derive(
    State(state): State<AppState>,
    body: Result<Json<DeriveRequest>, JsonRejection>,
) -> Result<Json<DeriveResponse>, AppError> {
    let req = extract_json(body)?;
    let vat_percentage = req
        .vat_percentage
        .unwrap_or(state.service.settings().default_vat_percentage);
    validate_amounts(req.amount, vat_percentage)?;
    let derived = derive_amounts(req.amount, vat_percentage);
    Ok(Json(DeriveResponse {
        amount: req.amount,
        vat_percentage,
        vat_amount: derived.vat_amount,
        total_amount: derived.total_amount,
    }))
}
