//! # safetrade-api: Axum API Services for SafeTrade
//!
//! HTTP surface over [`safetrade_lifecycle::SafeTradeService`]. Handlers
//! authenticate the caller, parse the request and map
//! [`safetrade_core::LifecycleError`] onto status codes. All lifecycle
//! rules live in the service and the state crate.
//!
//! ## API Surface
//!
//! | Prefix                      | Module                   |
//! |-----------------------------|--------------------------|
//! | `/v1/transactions/*`        | [`routes::transactions`] |
//! | `/v1/disputes/*`            | [`routes::disputes`]     |
//! | `/v1/invoices/*`            | [`routes::invoices`]     |
//! | `/v1/reviews/*`             | [`routes::reviews`]      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → MetricsMiddleware (per route) → Handler
//! ```
//!
//! `/health/*`, `/metrics` and `/openapi.json` sit outside authentication.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use safetrade_state::{LifecycleStatus, TransactionStatus};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::{metrics_middleware, prometheus_handle, record_status_counts};

pub use crate::error::AppError;
pub use crate::state::{AppConfig, AppState};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::transactions::router())
        .merge(routes::disputes::router())
        .merge(routes::invoices::router())
        .merge(routes::reviews::router())
        .route_layer(from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let public = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics))
        .merge(openapi::router());

    Router::new()
        .merge(public)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once storage answers.
async fn readiness(State(state): State<AppState>) -> Result<&'static str, AppError> {
    if let Some(pool) = &state.db_pool {
        sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
            tracing::warn!(error = %e, "readiness check failed");
            AppError::ServiceUnavailable("database unreachable".to_string())
        })?;
    }
    Ok("ready")
}

/// GET /metrics: Prometheus text exposition.
async fn render_metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let handle = prometheus_handle()
        .ok_or_else(|| AppError::ServiceUnavailable("metrics recorder unavailable".to_string()))?;

    let transactions = state.service.list_transactions(None).await?;
    record_status_counts(TransactionStatus::ALL.iter().map(|status| {
        let count = transactions.iter().filter(|t| t.status == *status).count();
        (status.as_str(), count)
    }));

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(AppState::in_memory(AppConfig::default()).unwrap())
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_probes_answer_without_database() {
        let (status, body) = get_text(test_app(), "/health/liveness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (status, body) = get_text(test_app(), "/health/readiness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");
    }

    #[tokio::test]
    async fn test_probes_bypass_auth() {
        let config = AppConfig {
            auth_token: Some("s3cret".to_string()),
            ..AppConfig::default()
        };
        let app = app(AppState::in_memory(config).unwrap());
        let (status, _) = get_text(app.clone(), "/health/liveness").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get_text(app, "/v1/transactions").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_openapi_served() {
        let (status, body) = get_text(test_app(), "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("SafeTrade API"));
    }

    #[tokio::test]
    async fn test_metrics_exposes_status_gauges() {
        if prometheus_handle().is_none() {
            return;
        }
        let (status, body) = get_text(test_app(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("safetrade_transactions"));
        assert!(body.contains(r#"status="awaiting_bank_transfer""#));
    }
}
