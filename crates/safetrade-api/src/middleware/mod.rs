//! # Middleware
//!
//! Tower layers that wrap the `/v1` router. Authentication lives in
//! [`crate::auth`]; request tracing uses `tower_http::trace::TraceLayer`
//! directly.

pub mod metrics;
