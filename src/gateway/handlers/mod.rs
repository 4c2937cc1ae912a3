pub mod health;
pub use self::health::health;

pub mod create_user;
pub use self::create_user::create_user;

pub mod reset_password;
pub use self::reset_password::reset_password;

pub mod delete_user;
pub use self::delete_user::delete_user;

pub mod enable_mfa;
pub use self::enable_mfa::enable_mfa;

// common types for the handlers
use crate::provider::ProviderError;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Uniform failure body.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

/// Request body for the endpoints keyed by email.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

pub type HandlerError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("missing or invalid {0}")]
    Validation(&'static str),
    #[error("no user with email {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("profile upsert failed for identity {user_id} (rolled back: {rolled_back}): {source}")]
    Compensated {
        user_id: Uuid,
        rolled_back: bool,
        source: ProviderError,
    },
    #[error("failed to generate temporary password: {0}")]
    Random(#[from] rand::Error),
}

/// Log the detailed cause and answer with the endpoint's fixed message.
pub(crate) fn reject(endpoint: &str, message: &'static str, err: &AdminError) -> HandlerError {
    error!("{} failed: {}", endpoint, err);
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message)))
}

/// Sanitized email that at least looks like one.
pub(crate) fn required_email(email: Option<&str>) -> Result<String, AdminError> {
    let email = super::sanitize::sanitize(email);
    if email.contains('@') {
        Ok(email)
    } else {
        Err(AdminError::Validation("email"))
    }
}
