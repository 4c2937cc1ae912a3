//! Bearer-token gate in front of the admin routes.

use super::{client_origin, handlers::ErrorBody};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc};
use subtle::ConstantTimeEq;
use tracing::warn;

pub const ACCESS_DENIED: &str = "Access denied";

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny,
}

/// Holds the admin secret for the lifetime of the server.
#[derive(Clone)]
pub struct AdminGate {
    secret: SecretString,
}

impl fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminGate")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl AdminGate {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Check an `Authorization` header value. Only `Bearer <secret>` is accepted.
    #[must_use]
    pub fn authorize(&self, header: Option<&str>) -> AuthDecision {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return AuthDecision::Deny;
        }

        let Some(token) = header.and_then(|value| value.strip_prefix(BEARER_PREFIX)) else {
            return AuthDecision::Deny;
        };

        if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
            AuthDecision::Allow
        } else {
            AuthDecision::Deny
        }
    }
}

/// Middleware for the admin routes.
pub async fn require_admin(
    State(gate): State<Arc<AdminGate>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match gate.authorize(header) {
        AuthDecision::Allow => next.run(request).await,
        AuthDecision::Deny => {
            warn!(
                "Unauthorized access attempt from {} on {}",
                client_origin(&request),
                request.uri().path()
            );

            (StatusCode::FORBIDDEN, Json(ErrorBody::new(ACCESS_DENIED))).into_response()
        }
    }
}
