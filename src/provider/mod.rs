//! Identity provider seam.
//!
//! The gateway never stores users itself; every lifecycle call goes through an
//! [`IdentityProvider`]. [`SupabaseProvider`] talks to a Supabase-compatible admin API.

pub mod supabase;

#[cfg(test)]
pub(crate) mod memory;

pub use self::supabase::SupabaseProvider;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// Page size used when searching users by email.
pub const USERS_PER_PAGE: u32 = 50;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

pub type SharedProvider = Arc<dyn IdentityProvider>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid identity provider endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password: SecretString,
}

/// Row of the `users` metadata table, upserted on `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub role: String,
    pub specialty: Option<String>,
    pub area: Option<String>,
    pub updated_at: String,
}

pub trait IdentityProvider: Send + Sync {
    /// Create a confirmed account.
    fn create_user<'a>(&'a self, user: &'a NewUser) -> ProviderFuture<'a, ProviderUser>;

    /// One page of accounts, `page` starts at 1.
    fn list_users(&self, page: u32, per_page: u32) -> ProviderFuture<'_, Vec<ProviderUser>>;

    fn update_password<'a>(
        &'a self,
        user_id: Uuid,
        password: &'a SecretString,
    ) -> ProviderFuture<'a, ()>;

    fn delete_user(&self, user_id: Uuid) -> ProviderFuture<'_, ()>;

    fn upsert_profile<'a>(&'a self, profile: &'a UserProfile) -> ProviderFuture<'a, ()>;
}

/// Find an account by exact email, walking every page.
///
/// # Errors
/// Returns the first provider error encountered.
pub async fn find_user_by_email(
    provider: &dyn IdentityProvider,
    email: &str,
) -> Result<Option<ProviderUser>, ProviderError> {
    let mut page = 1;
    loop {
        let users = provider.list_users(page, USERS_PER_PAGE).await?;
        let count = users.len();

        if let Some(user) = users
            .into_iter()
            .find(|user| user.email.as_deref() == Some(email))
        {
            return Ok(Some(user));
        }

        if count < USERS_PER_PAGE as usize {
            debug!("searched {} page(s), no user found", page);
            return Ok(None);
        }

        page += 1;
    }
}
