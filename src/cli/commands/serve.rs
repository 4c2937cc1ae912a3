use crate::gateway::rate_limit::DEFAULT_LIMIT;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

pub const NAME: &str = "serve";

pub const ARG_PORT: &str = "port";
pub const ARG_SUPABASE_URL: &str = "supabase-url";
pub const ARG_SERVICE_ROLE_KEY: &str = "supabase-service-role-key";
pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_RATE_LIMIT: &str = "rate-limit";
pub const ARG_TRUST_PROXY: &str = "trust-proxy";

/// Environment/config key names shared with the `.env` file.
pub const ENV_PORT: &str = "PORT";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_FRONTEND_URL: &str = "FRONTEND_URL";

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Run the admin HTTP gateway")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on [default: 4000]")
                .env(ENV_PORT)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(super::config_arg())
        .arg(
            Arg::new(ARG_SUPABASE_URL)
                .long(ARG_SUPABASE_URL)
                .help("Identity provider base URL, example: https://<project>.supabase.co")
                .env(ENV_SUPABASE_URL),
        )
        .arg(
            Arg::new(ARG_SERVICE_ROLE_KEY)
                .long(ARG_SERVICE_ROLE_KEY)
                .help("Identity provider service role key")
                .env(ENV_SERVICE_ROLE_KEY)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Allowed CORS origin, any origin when unset")
                .env(ENV_FRONTEND_URL),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT)
                .long(ARG_RATE_LIMIT)
                .help("Requests allowed per client per minute [default: 60]")
                .env("KEYGATE_RATE_LIMIT")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY)
                .long(ARG_TRUST_PROXY)
                .help("Identify clients by X-Forwarded-For, only behind a proxy that sets it")
                .env("KEYGATE_TRUST_PROXY")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub port: Option<u16>,
    pub config: PathBuf,
    pub supabase_url: Option<String>,
    pub service_role_key: Option<String>,
    pub frontend_url: Option<String>,
    pub rate_limit: u32,
    pub trust_proxy: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            port: matches.get_one::<u16>(ARG_PORT).copied(),
            config: super::config_path(matches),
            supabase_url: matches.get_one::<String>(ARG_SUPABASE_URL).cloned(),
            service_role_key: matches.get_one::<String>(ARG_SERVICE_ROLE_KEY).cloned(),
            frontend_url: matches.get_one::<String>(ARG_FRONTEND_URL).cloned(),
            rate_limit: matches
                .get_one::<u32>(ARG_RATE_LIMIT)
                .copied()
                .unwrap_or(DEFAULT_LIMIT),
            trust_proxy: matches.get_flag(ARG_TRUST_PROXY),
        }
    }
}
