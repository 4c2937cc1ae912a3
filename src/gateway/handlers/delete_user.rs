use super::{reject, required_email, AdminError, EmailRequest, ErrorBody, HandlerError, Message};
use crate::provider::{find_user_by_email, IdentityProvider, SharedProvider};
use axum::{extract::Extension, Json};
use tracing::{info, instrument};

const FAILURE: &str = "Could not delete user";

#[utoipa::path(
    post,
    path= "/delete-user",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "User deleted", body = Message),
        (status = 400, description = "Invalid email, unknown user or provider failure", body = ErrorBody),
        (status = 403, description = "Missing or wrong admin key", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    ),
    security(("admin_key" = [])),
    tag= "admin"
)]
#[instrument(skip(provider, payload))]
pub async fn delete_user(
    provider: Extension<SharedProvider>,
    payload: Option<Json<EmailRequest>>,
) -> Result<Json<Message>, HandlerError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    delete(provider.0.as_ref(), request.email.as_deref())
        .await
        .map(Json)
        .map_err(|err| reject("delete-user", FAILURE, &err))
}

/// # Errors
/// Fails on an invalid email, an unknown account or any provider error.
pub async fn delete(
    provider: &dyn IdentityProvider,
    email: Option<&str>,
) -> Result<Message, AdminError> {
    let email = required_email(email)?;

    let user = find_user_by_email(provider, &email)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.clone()))?;

    provider.delete_user(user.id).await?;

    info!("Deleted user {}", email);

    Ok(Message {
        message: format!("User {email} deleted"),
    })
}
