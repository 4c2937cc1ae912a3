use super::{EmailRequest, ErrorBody, Message};
use crate::gateway::sanitize::sanitize;
use axum::Json;
use tracing::{info, instrument};

/// The provider does not let an admin enroll a second factor on someone's behalf, so this only
/// tells the operator what the user has to do. A missing or unreadable body is an empty email.
#[utoipa::path(
    post,
    path= "/enable-mfa",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "Instructions for the user", body = Message),
        (status = 403, description = "Missing or wrong admin key", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    ),
    security(("admin_key" = [])),
    tag= "admin"
)]
#[instrument(skip(payload))]
pub async fn enable_mfa(payload: Option<Json<EmailRequest>>) -> Json<Message> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let email = sanitize(request.email.as_deref());
    info!("MFA requested for {}", email);

    Json(mfa_notice(&email))
}

#[must_use]
pub fn mfa_notice(email: &str) -> Message {
    Message {
        message: format!(
            "User {email} must enable MFA from their own authenticator app after signing in"
        ),
    }
}
