use super::{reject, AdminError, ErrorBody, HandlerError};
use crate::{
    gateway::sanitize::sanitize,
    provider::{IdentityProvider, NewUser, SharedProvider, UserProfile},
};
use axum::{extract::Extension, Json};
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

pub const EMAIL_DOMAIN: &str = "local.app";
pub const DEFAULT_ROLE: &str = "doctor";
pub const DOCTOR_SPECIALTY: &str = "General";
pub const PHARMACY_ROLE: &str = "encargado";
pub const PHARMACY_AREA: &str = "Farmacia Central";

const FAILURE: &str = "Could not create user";

#[derive(ToSchema, Serialize, Deserialize, Default)]
pub struct CreateUserRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("role", &self.role)
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserCreated {
    pub message: String,
    pub email: String,
    /// Echoed back so the operator can hand it over.
    pub password: String,
    pub role: String,
}

#[utoipa::path(
    post,
    path= "/create-user",
    request_body = CreateUserRequest,
    responses (
        (status = 200, description = "Identity created and profile stored", body = UserCreated),
        (status = 400, description = "Invalid input or provider failure", body = ErrorBody),
        (status = 403, description = "Missing or wrong admin key", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
    ),
    security(("admin_key" = [])),
    tag= "admin"
)]
#[instrument(skip(provider, payload))]
pub async fn create_user(
    provider: Extension<SharedProvider>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<Json<UserCreated>, HandlerError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    create(provider.0.as_ref(), request)
        .await
        .map(Json)
        .map_err(|err| reject("create-user", FAILURE, &err))
}

/// Create the identity, then its profile row. The identity is removed again if the profile
/// cannot be stored.
///
/// # Errors
/// [`AdminError::Validation`] for an empty name or password, [`AdminError::Provider`] when the
/// identity cannot be created and [`AdminError::Compensated`] when the profile upsert fails.
pub async fn create(
    provider: &dyn IdentityProvider,
    request: CreateUserRequest,
) -> Result<UserCreated, AdminError> {
    let name = sanitize(request.name.as_deref());
    let password = sanitize(request.password.as_deref());
    let role = match sanitize(request.role.as_deref()) {
        role if role.is_empty() => DEFAULT_ROLE.to_string(),
        role => role,
    };

    if name.is_empty() {
        return Err(AdminError::Validation("name"));
    }
    if password.is_empty() {
        return Err(AdminError::Validation("password"));
    }

    let email = format!("{name}@{EMAIL_DOMAIN}");
    let new_user = NewUser {
        email: email.clone(),
        password: SecretString::from(password),
    };

    let created = provider.create_user(&new_user).await?;

    let profile = UserProfile {
        name: name.clone(),
        specialty: (role == DEFAULT_ROLE).then(|| DOCTOR_SPECIALTY.to_string()),
        area: (role == PHARMACY_ROLE).then(|| PHARMACY_AREA.to_string()),
        role: role.clone(),
        updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    if let Err(source) = provider.upsert_profile(&profile).await {
        warn!(
            "Profile upsert failed for {}, removing identity {}",
            name, created.id
        );

        let rolled_back = match provider.delete_user(created.id).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    "Failed to remove identity {} after profile failure: {}",
                    created.id, err
                );
                false
            }
        };

        return Err(AdminError::Compensated {
            user_id: created.id,
            rolled_back,
            source,
        });
    }

    info!("Created user {} with role {}", email, role);

    Ok(UserCreated {
        message: "User created successfully".to_string(),
        email,
        password: new_user.password.expose_secret().to_string(),
        role,
    })
}
