//! # Prometheus Metrics
//!
//! Request counters and latency histograms go through the `metrics` facade.
//! The Prometheus recorder is installed once per process and rendered by
//! `GET /metrics`. Without an installed recorder every macro is a no-op.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "safetrade_http_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "safetrade_http_request_duration_seconds";
pub const TRANSACTIONS_BY_STATUS: &str = "safetrade_transactions";

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder on first call.
///
/// Returns `None` if another recorder already owns the process.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder not installed; /metrics disabled");
                None
            }
        })
        .clone()
}

/// Count and time every routed request.
///
/// Mounted with `route_layer` so the matched route template, not the raw
/// URI, becomes the `path` label.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_owned();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    ::metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method, "path" => path)
        .record(start.elapsed().as_secs_f64());

    response
}

/// Publish the current number of live transactions per status.
pub fn record_status_counts<'a>(counts: impl IntoIterator<Item = (&'a str, usize)>) {
    for (status, count) in counts {
        ::metrics::gauge!(TRANSACTIONS_BY_STATUS, "status" => status.to_owned()).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_handle_is_installed_once() {
        let first = prometheus_handle();
        let second = prometheus_handle();
        assert_eq!(first.is_some(), second.is_some());
    }

    #[tokio::test]
    async fn test_requests_are_labelled_by_route_template() {
        let Some(handle) = prometheus_handle() else {
            return;
        };
        let app = Router::new()
            .route("/items/{id}", get(|| async { "ok" }))
            .route_layer(from_fn(metrics_middleware));

        let resp = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/items/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let rendered = handle.render();
        assert!(rendered.contains(REQUESTS_TOTAL));
        assert!(rendered.contains(r#"path="/items/{id}""#));
        assert!(!rendered.contains(r#"path="/items/42""#));
    }

    #[test]
    fn test_status_gauges_render() {
        let Some(handle) = prometheus_handle() else {
            return;
        };
        record_status_counts([("pending", 3), ("completed", 1)]);
        let rendered = handle.render();
        assert!(rendered.contains(TRANSACTIONS_BY_STATUS));
        assert!(rendered.contains(r#"status="pending""#));
    }
}
