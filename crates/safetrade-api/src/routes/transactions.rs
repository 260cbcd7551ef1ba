//! # Transaction Endpoints
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/v1/transactions` | `create_transaction` |
//! | `GET` | `/v1/transactions` | `list_transactions` |
//! | `GET` | `/v1/transactions/{id}` | `get_transaction` |
//! | `DELETE` | `/v1/transactions/{id}` | `delete_transaction` |
//! | `POST` | `/v1/transactions/{id}/transition` | `transition_transaction` |
//! | `GET` | `/v1/transactions/{id}/settlement` | `get_settlement` |

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use safetrade_core::{Currency, DealerId, UserId, VehicleId};
use safetrade_state::{LifecycleStatus, NewTransaction, TransactionCommand, TransactionStatus};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_id, extract_json, extract_query};
use crate::state::AppState;

// ─── Request types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTransactionRequest {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub dealer_id: Option<Uuid>,
    /// Purchase price, at most two decimal places.
    #[schema(value_type = String, example = "24500.00")]
    pub amount: Decimal,
    /// ISO 4217 code. Defaults to EUR.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub escrow_account_iban: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateTransactionRequest {
    fn into_domain(self) -> Result<NewTransaction, AppError> {
        let currency = match self.currency.as_deref() {
            Some(code) => {
                Currency::new(code).map_err(|e| AppError::validation("currency", e.to_string()))?
            }
            None => Currency::eur(),
        };
        Ok(NewTransaction {
            buyer_id: UserId::from_uuid(self.buyer_id),
            seller_id: UserId::from_uuid(self.seller_id),
            vehicle_id: VehicleId::from_uuid(self.vehicle_id),
            dealer_id: self.dealer_id.map(DealerId::from_uuid),
            amount: self.amount,
            currency,
            escrow_account_iban: self.escrow_account_iban,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TransactionTransitionRequest {
    /// Target status, e.g. "payment_verified".
    #[schema(value_type = String)]
    pub to: TransactionStatus,
    /// Rejects the call with 409 if the stored status differs. Without it
    /// the edge is checked against the status found at load time, so a
    /// repeated request after a success is a 409 `INVALID_TRANSITION`
    /// rather than `CONFLICT`. Send it to detect lost updates.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub expected_status: Option<TransactionStatus>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub payment_proof: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    /// Only transactions in this status.
    pub status: Option<String>,
}

// ─── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/transactions",
            post(create_transaction).get(list_transactions),
        )
        .route(
            "/v1/transactions/{id}",
            get(get_transaction).delete(delete_transaction),
        )
        .route(
            "/v1/transactions/{id}/transition",
            post(transition_transaction),
        )
        .route("/v1/transactions/{id}/settlement", get(get_settlement))
}

// ─── Handlers ────────────────────────────────────────────────────────

/// POST /v1/transactions: Open a trade. Codes and fees are derived.
#[utoipa::path(
    post,
    path = "/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction opened"),
        (status = 403, description = "Caller may not open this trade", body = crate::error::ErrorBody),
        (status = 422, description = "Amount or parties invalid", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn create_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = extract_json(body)?.into_domain()?;
    let transaction = state
        .service
        .open_transaction(input, &caller.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /v1/transactions: Newest first. Buyers and sellers see only
/// the trades they are party to.
#[utoipa::path(
    get,
    path = "/v1/transactions",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "Transactions visible to the caller"),
        (status = 403, description = "Party role without a user id", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn list_transactions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListTransactionsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let query = extract_query(query)?;
    let status = match query.status.as_deref() {
        Some(name) => Some(TransactionStatus::from_name(name).ok_or_else(|| {
            AppError::validation("status", format!("unknown transaction status {name:?}"))
        })?),
        None => None,
    };
    Ok(Json(
        state
            .service
            .list_transactions_for(status, &caller.actor())
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction"),
        (status = 404, description = "Unknown or deleted", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn get_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.transaction(id).await?))
}

/// POST /v1/transactions/{id}/transition: Validate and apply a status change.
///
/// Clients that need lost-update detection send `expected_status`; a
/// mismatch is a 409 `CONFLICT`. A disputed trade with an unfinished
/// dispute only moves through that dispute (409 `CONFLICT`).
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/transition",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = TransactionTransitionRequest,
    responses(
        (status = 200, description = "Transition committed"),
        (status = 403, description = "Role may not take this edge", body = crate::error::ErrorBody),
        (status = 409, description = "INVALID_TRANSITION for an illegal edge; CONFLICT when expected_status is stale, a concurrent write won, or an unfinished dispute holds the trade", body = crate::error::ErrorBody),
        (status = 422, description = "Missing reason or payment proof", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn transition_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<TransactionTransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    let req = extract_json(body)?;
    let cmd = TransactionCommand {
        to: req.to,
        reason: req.reason,
        payment_proof: req.payment_proof,
    };
    let transaction = state
        .service
        .transition_transaction(id, req.expected_status, cmd, &caller.actor())
        .await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{id}/settlement",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Fee and payout breakdown"),
        (status = 404, description = "Unknown transaction", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn get_settlement(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    Ok(Json(state.service.settlement(id).await?))
}

/// DELETE /v1/transactions/{id}: Soft delete a finished trade (admin).
#[utoipa::path(
    delete,
    path = "/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an operator", body = crate::error::ErrorBody),
        (status = 422, description = "Transaction still running", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub(crate) async fn delete_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_id(id)?;
    state
        .service
        .delete_transaction(id, &caller.actor())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
