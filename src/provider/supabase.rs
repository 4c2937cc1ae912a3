//! Supabase admin API client (GoTrue admin endpoints + PostgREST `users` table).
//!
//! Every call authenticates with the service role key, sent both as `apikey` and as a
//! bearer token.

use super::{IdentityProvider, NewUser, ProviderError, ProviderFuture, ProviderUser, UserProfile};
use crate::APP_USER_AGENT;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

const ADMIN_USERS_PATH: &str = "auth/v1/admin/users";
const PROFILES_PATH: &str = "rest/v1/users";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

#[derive(Clone)]
pub struct SupabaseProvider {
    client: Client,
    base_url: Url,
    service_role_key: SecretString,
}

impl SupabaseProvider {
    /// Build a client for the project at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, service_role_key: SecretString) -> Result<Self, ProviderError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last segment unless the path ends with `/`.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            service_role_key,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.service_role_key.expose_secret();
        request.header("apikey", key).bearer_auth(key)
    }
}

impl std::fmt::Debug for SupabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseProvider")
            .field("base_url", &self.base_url.as_str())
            .field("service_role_key", &"***")
            .finish_non_exhaustive()
    }
}

impl IdentityProvider for SupabaseProvider {
    fn create_user<'a>(&'a self, user: &'a NewUser) -> ProviderFuture<'a, ProviderUser> {
        Box::pin(async move {
            let url = self.endpoint(ADMIN_USERS_PATH)?;
            let payload = json!({
                "email": user.email,
                "password": user.password.expose_secret(),
                "email_confirm": true,
            });

            let response = self
                .authorized(self.client.post(url))
                .json(&payload)
                .send()
                .await?;

            let created: ProviderUser = check(response).await?.json().await?;
            debug!("created identity {}", created.id);
            Ok(created)
        })
    }

    fn list_users(&self, page: u32, per_page: u32) -> ProviderFuture<'_, Vec<ProviderUser>> {
        Box::pin(async move {
            let url = self.endpoint(ADMIN_USERS_PATH)?;
            let response = self
                .authorized(self.client.get(url))
                .query(&[("page", page), ("per_page", per_page)])
                .send()
                .await?;

            let page: UserPage = check(response).await?.json().await?;
            Ok(page.users)
        })
    }

    fn update_password<'a>(
        &'a self,
        user_id: Uuid,
        password: &'a SecretString,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("{ADMIN_USERS_PATH}/{user_id}"))?;
            let response = self
                .authorized(self.client.put(url))
                .json(&json!({ "password": password.expose_secret() }))
                .send()
                .await?;

            check(response).await?;
            Ok(())
        })
    }

    fn delete_user(&self, user_id: Uuid) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("{ADMIN_USERS_PATH}/{user_id}"))?;
            let response = self.authorized(self.client.delete(url)).send().await?;

            check(response).await?;
            Ok(())
        })
    }

    fn upsert_profile<'a>(&'a self, profile: &'a UserProfile) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(PROFILES_PATH)?;
            let response = self
                .authorized(self.client.post(url))
                .query(&[("on_conflict", "name")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(profile)
                .send()
                .await?;

            check(response).await?;
            Ok(())
        })
    }
}

#[instrument(skip(response), fields(status = %response.status()))]
async fn check(response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    Err(ProviderError::Api {
        status: status.as_u16(),
        message: error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
    })
}

/// GoTrue uses `msg`, PostgREST `message`, OAuth style errors `error_description`.
fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| json[key].as_str())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "service-role-key";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn provider(server: &MockServer) -> SupabaseProvider {
        SupabaseProvider::new(&server.uri(), SecretString::from(KEY)).unwrap()
    }

    #[test]
    fn base_url_gets_trailing_slash() -> Result<()> {
        let provider =
            SupabaseProvider::new("https://x.supabase.co/proxy", SecretString::from(KEY))?;
        assert_eq!(provider.base_url().as_str(), "https://x.supabase.co/proxy/");
        assert_eq!(
            provider.endpoint(ADMIN_USERS_PATH)?.as_str(),
            "https://x.supabase.co/proxy/auth/v1/admin/users"
        );
        Ok(())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = SupabaseProvider::new("not a url", SecretString::from(KEY));
        assert!(matches!(result, Err(ProviderError::Endpoint(_))));
    }

    #[test]
    fn debug_hides_service_role_key() -> Result<()> {
        let provider = SupabaseProvider::new("https://x.supabase.co", SecretString::from(KEY))?;
        assert!(!format!("{provider:?}").contains(KEY));
        Ok(())
    }

    #[test]
    fn error_message_prefers_known_fields() {
        assert_eq!(
            error_message(r#"{"code":422,"msg":"User already registered"}"#).as_deref(),
            Some("User already registered")
        );
        assert_eq!(
            error_message(r#"{"message":"duplicate key"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(error_message("<html>"), None);
    }

    #[tokio::test]
    async fn create_user_sends_confirmed_account() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(header("apikey", KEY))
            .and(header("Authorization", format!("Bearer {KEY}").as_str()))
            .and(body_json(json!({
                "email": "drx@local.app",
                "password": "Str0ngP@ss!",
                "email_confirm": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "email": "drx@local.app",
                "aud": "authenticated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = NewUser {
            email: "drx@local.app".to_string(),
            password: SecretString::from("Str0ngP@ss!"),
        };
        let created = provider(&server).create_user(&user).await?;
        assert_eq!(created.id, id);
        assert_eq!(created.email.as_deref(), Some("drx@local.app"));
        Ok(())
    }

    #[tokio::test]
    async fn create_user_maps_api_errors() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "msg": "A user with this email address has already been registered"
            })))
            .mount(&server)
            .await;

        let user = NewUser {
            email: "drx@local.app".to_string(),
            password: SecretString::from("x"),
        };
        let result = provider(&server).create_user(&user).await;
        match result {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 422);
                assert!(message.contains("already been registered"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn list_users_passes_pagination() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "2"))
            .and(query_param("per_page", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    { "id": id, "email": "a@local.app" },
                    { "id": Uuid::new_v4(), "phone": "+100" }
                ],
                "aud": "authenticated"
            })))
            .mount(&server)
            .await;

        let users = provider(&server).list_users(2, 50).await?;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, id);
        assert_eq!(users[1].email, None);
        Ok(())
    }

    #[tokio::test]
    async fn update_password_and_delete_target_user_path() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        let user_path = format!("/auth/v1/admin/users/{id}");
        Mock::given(method("PUT"))
            .and(path(user_path.as_str()))
            .and(body_json(json!({ "password": "temporary" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(user_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider
            .update_password(id, &SecretString::from("temporary"))
            .await?;
        provider.delete_user(id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn upsert_profile_merges_on_name() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(query_param("on_conflict", "name"))
            .and(headers(
                "Prefer",
                vec!["resolution=merge-duplicates", "return=minimal"],
            ))
            .and(body_json(json!({
                "name": "drx",
                "role": "doctor",
                "specialty": "General",
                "area": null,
                "updated_at": "2025-01-01T00:00:00.000Z"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let profile = UserProfile {
            name: "drx".to_string(),
            role: "doctor".to_string(),
            specialty: Some("General".to_string()),
            area: None,
            updated_at: "2025-01-01T00:00:00.000Z".to_string(),
        };
        provider(&server).upsert_profile(&profile).await?;
        Ok(())
    }
}
