//! # OpenAPI Document Assembly
//!
//! Collects every utoipa-documented handler into one OpenAPI 3.1 document,
//! served unauthenticated at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SafeTrade API",
        version = "0.1.0",
        description = "Escrow-backed vehicle purchase lifecycle: transactions, disputes, invoices and reviews."
    ),
    paths(
        // Transactions
        crate::routes::transactions::create_transaction,
        crate::routes::transactions::list_transactions,
        crate::routes::transactions::get_transaction,
        crate::routes::transactions::transition_transaction,
        crate::routes::transactions::get_settlement,
        crate::routes::transactions::delete_transaction,
        // Disputes
        crate::routes::disputes::file_dispute,
        crate::routes::disputes::list_disputes,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::transition_dispute,
        crate::routes::disputes::resolve_dispute,
        crate::routes::disputes::respond_to_dispute,
        // Invoices
        crate::routes::invoices::create_invoice,
        crate::routes::invoices::list_invoices,
        crate::routes::invoices::get_invoice,
        crate::routes::invoices::reprice_invoice,
        crate::routes::invoices::transition_invoice,
        crate::routes::invoices::derive,
        // Reviews
        crate::routes::reviews::submit_review,
        crate::routes::reviews::get_review,
        crate::routes::reviews::verify_review,
        crate::routes::reviews::auto_verify_review,
        crate::routes::reviews::reject_review,
        crate::routes::reviews::flag_review,
        crate::routes::reviews::set_visibility,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::transactions::CreateTransactionRequest,
        crate::routes::transactions::TransactionTransitionRequest,
        crate::routes::disputes::FileDisputeRequest,
        crate::routes::disputes::DisputeTransitionRequest,
        crate::routes::disputes::ResolveDisputeRequest,
        crate::routes::disputes::DisputeResponseRequest,
        crate::routes::invoices::CreateInvoiceRequest,
        crate::routes::invoices::RepriceInvoiceRequest,
        crate::routes::invoices::InvoiceTransitionRequest,
        crate::routes::invoices::DeriveRequest,
        crate::routes::invoices::DeriveResponse,
        crate::routes::reviews::SubmitReviewRequest,
        crate::routes::reviews::VerifyReviewRequest,
        crate::routes::reviews::RejectReviewRequest,
        crate::routes::reviews::VisibilityRequest,
    )),
    modifiers(&SecurityAddon),
    security(("bearer_auth" = [])),
    tags(
        (name = "transactions", description = "Escrow transaction lifecycle"),
        (name = "disputes", description = "Complaints and their settlement"),
        (name = "invoices", description = "Invoice issue and payment tracking"),
        (name = "reviews", description = "Post-trade reviews and moderation"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
