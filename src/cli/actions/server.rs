use crate::{
    cli::commands::serve::{ENV_FRONTEND_URL, ENV_PORT, ENV_SERVICE_ROLE_KEY, ENV_SUPABASE_URL},
    config_file::ConfigRecord,
    gateway::{
        self, frontend_origin, rate_limit::DEFAULT_WINDOW, AdminGate, FixedWindowRateLimiter,
        Gateway, DEFAULT_PORT,
    },
    provider::SupabaseProvider,
    ADMIN_KEY_NAME,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: Option<u16>,
    pub config: PathBuf,
    pub supabase_url: Option<String>,
    pub service_role_key: Option<SecretString>,
    pub frontend_url: Option<String>,
    pub rate_limit: u32,
    pub trust_proxy: bool,
}

/// Flags and environment merged with the configuration file.
#[derive(Debug)]
pub struct Settings {
    pub port: u16,
    pub supabase_url: String,
    pub service_role_key: SecretString,
    pub admin_key: SecretString,
    pub frontend_url: Option<String>,
    pub rate_limit: u32,
    pub trust_proxy: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Args {
    /// Flags and environment win over the file. The admin key only ever comes from the file.
    ///
    /// # Errors
    /// Returns an error if the provider URL or service role key is missing, or `PORT` in the
    /// file is not a valid port.
    pub fn resolve(self, record: &ConfigRecord) -> Result<Settings> {
        let port = match self.port {
            Some(port) => port,
            None => record
                .get_non_empty(ENV_PORT)
                .map(|port| {
                    port.parse::<u16>()
                        .with_context(|| format!("Invalid {ENV_PORT} in configuration: {port}"))
                })
                .transpose()?
                .unwrap_or(DEFAULT_PORT),
        };

        let supabase_url = non_empty(self.supabase_url)
            .or_else(|| record.get_non_empty(ENV_SUPABASE_URL).map(str::to_string))
            .with_context(|| {
                format!("missing required argument: --supabase-url ({ENV_SUPABASE_URL})")
            })?;

        let service_role_key = self
            .service_role_key
            .filter(|key| !key.expose_secret().is_empty())
            .or_else(|| {
                record
                    .get_non_empty(ENV_SERVICE_ROLE_KEY)
                    .map(|key| SecretString::from(key.to_string()))
            })
            .with_context(|| {
                format!(
                    "missing required argument: --supabase-service-role-key ({ENV_SERVICE_ROLE_KEY})"
                )
            })?;

        let admin_key = SecretString::from(record.get(ADMIN_KEY_NAME).unwrap_or_default().to_string());

        let frontend_url = non_empty(self.frontend_url)
            .or_else(|| record.get_non_empty(ENV_FRONTEND_URL).map(str::to_string));

        Ok(Settings {
            port,
            supabase_url,
            service_role_key,
            admin_key,
            frontend_url,
            rate_limit: self.rate_limit,
            trust_proxy: self.trust_proxy,
        })
    }
}

/// Load the configuration file, build the gateway and serve until shutdown.
///
/// # Errors
/// Returns an error if required settings are missing or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.config.clone();

    let record = ConfigRecord::load(&config).unwrap_or_else(|err| {
        warn!("{:#}, using flags and environment only", err);
        ConfigRecord::default()
    });

    let Settings {
        port,
        supabase_url,
        service_role_key,
        admin_key,
        frontend_url,
        rate_limit,
        trust_proxy,
    } = args.resolve(&record)?;

    if admin_key.expose_secret().is_empty() {
        warn!(
            "{} is not set in {}, every admin request will be denied",
            ADMIN_KEY_NAME,
            config.display()
        );
    }

    let provider = SupabaseProvider::new(&supabase_url, service_role_key)
        .context("Failed to build identity provider client")?;

    let mut gateway = Gateway::new(AdminGate::new(admin_key), Arc::new(provider))
        .with_rate_limiter(Arc::new(FixedWindowRateLimiter::new(
            rate_limit,
            DEFAULT_WINDOW,
        )))
        .with_trusted_proxy(trust_proxy);

    match frontend_url {
        Some(url) => gateway = gateway.with_allowed_origin(frontend_origin(&url)?),
        None => info!("{} not set, CORS allows any origin", ENV_FRONTEND_URL),
    }

    info!(
        "Identity provider: {}, rate limit: {} requests/min",
        supabase_url, rate_limit
    );
    if trust_proxy {
        info!("Client addresses taken from X-Forwarded-For / X-Real-IP");
    }

    gateway::serve(port, gateway).await
}
