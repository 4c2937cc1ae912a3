use super::{reject, required_email, AdminError, EmailRequest, ErrorBody, HandlerError};
use crate::{
    gateway::sanitize::generate_temporary_password,
    provider::{find_user_by_email, IdentityProvider, SharedProvider},
};
use axum::{extract::Extension, Json};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

const FAILURE: &str = "Could not reset password";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub message: String,
    pub email: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[utoipa::path(
    post,
    path= "/reset-password",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "Temporary password set", body = PasswordReset),
        (status = 400, description = "Invalid email, unknown user or provider failure", body = ErrorBody),
        (status = 403, description = "Missing or wrong admin key", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    ),
    security(("admin_key" = [])),
    tag= "admin"
)]
#[instrument(skip(provider, payload))]
pub async fn reset_password(
    provider: Extension<SharedProvider>,
    payload: Option<Json<EmailRequest>>,
) -> Result<Json<PasswordReset>, HandlerError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    reset(provider.0.as_ref(), request.email.as_deref())
        .await
        .map(Json)
        .map_err(|err| reject("reset-password", FAILURE, &err))
}

/// Replace the password of the account with a freshly generated one.
///
/// # Errors
/// Fails on an invalid email, an unknown account or any provider error.
pub async fn reset(
    provider: &dyn IdentityProvider,
    email: Option<&str>,
) -> Result<PasswordReset, AdminError> {
    let email = required_email(email)?;

    let user = find_user_by_email(provider, &email)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.clone()))?;

    let password = generate_temporary_password()?;
    provider.update_password(user.id, &password).await?;

    info!("Password reset for {}", email);

    Ok(PasswordReset {
        message: "Password reset".to_string(),
        email,
        new_password: password.expose_secret().to_string(),
    })
}
