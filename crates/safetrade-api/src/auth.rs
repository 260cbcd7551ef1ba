//! # Authentication Middleware
//!
//! Bearer tokens carry the acting role and user:
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   buyer, seller, dealer, admin, system
//! Bearer {secret}                    admin without a user binding
//! ```
//!
//! With no token configured, auth is disabled and the identity comes from
//! the optional `x-actor-role` / `x-actor-id` headers (default: admin).
//! Either way a [`CallerIdentity`] lands in the request extensions.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use safetrade_core::{Actor, ActorRole, UserId};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

// ─── CallerIdentity ──────────────────────────────────────────────────

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: ActorRole,
    pub user_id: Option<UserId>,
}

impl CallerIdentity {
    pub fn admin() -> Self {
        Self {
            role: ActorRole::Admin,
            user_id: None,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ─── Configuration ───────────────────────────────────────────────────

/// Custom `Debug` redacts the token.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ─── Token parsing ───────────────────────────────────────────────────

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn parse_role(name: &str) -> Result<ActorRole, String> {
    ActorRole::from_name(name).ok_or_else(|| format!("unknown role: {name}"))
}

fn parse_user(raw: &str, role: ActorRole) -> Result<Option<UserId>, String> {
    if raw.is_empty() {
        return match role {
            ActorRole::Admin | ActorRole::System => Ok(None),
            other => Err(format!("role '{other}' requires a user id")),
        };
    }
    raw.parse::<Uuid>()
        .map(|u| Some(UserId::from_uuid(u)))
        .map_err(|e| format!("invalid user id: {e}"))
}

/// Parse `{role}:{user_id}:{secret}` or a bare `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::admin())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = parse_role(role)?;
            Ok(CallerIdentity {
                role,
                user_id: parse_user(user, role)?,
            })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

/// Identity from the `x-actor-*` headers, used when auth is disabled.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, String> {
    let text = |name: &str| -> Result<Option<String>, String> {
        headers
            .get(name)
            .map(|v| {
                v.to_str()
                    .map(|s| s.trim().to_string())
                    .map_err(|_| format!("{name} is not valid ASCII"))
            })
            .transpose()
    };
    let role = match text(ACTOR_ROLE_HEADER)? {
        Some(name) => parse_role(&name)?,
        None => ActorRole::Admin,
    };
    let user = text(ACTOR_ID_HEADER)?.unwrap_or_default();
    Ok(CallerIdentity {
        role,
        user_id: parse_user(&user, role)?,
    })
}

// ─── Middleware ──────────────────────────────────────────────────────

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    let identity = match config {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => match request.headers().typed_get::<Authorization<Bearer>>() {
            Some(Authorization(bearer)) => match parse_bearer_token(bearer.token(), expected) {
                Ok(identity) => identity,
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    return unauthorized_response(&msg);
                }
            },
            None if request.headers().contains_key(header::AUTHORIZATION) => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
            None => {
                tracing::warn!("authentication failed: missing authorization header");
                return unauthorized_response("missing authorization header");
            }
        },
        _ => match identity_from_headers(request.headers()) {
            Ok(identity) => identity,
            Err(msg) => return AppError::BadRequest(msg).into_response(),
        },
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
