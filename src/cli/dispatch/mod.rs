//! Map parsed CLI arguments to an [`Action`].

use crate::cli::{
    actions::{rotate, server, Action},
    commands,
};
use anyhow::{bail, Result};
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if no known subcommand was given.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::serve::NAME, sub)) => {
            let options = commands::serve::Options::parse(sub);
            Ok(Action::Server(server::Args {
                port: options.port,
                config: options.config,
                supabase_url: options.supabase_url,
                service_role_key: options.service_role_key.map(SecretString::from),
                frontend_url: options.frontend_url,
                rate_limit: options.rate_limit,
                trust_proxy: options.trust_proxy,
            }))
        }
        Some((commands::rotate::NAME, sub)) => {
            let options = commands::rotate::Options::parse(sub);
            Ok(Action::Rotate(rotate::Args {
                config: options.config,
                backup_dir: options.backup_dir,
                audit_log: options.audit_log,
            }))
        }
        Some((name, _)) => bail!("unknown subcommand: {name}"),
        None => bail!("missing subcommand, expected `serve` or `rotate`"),
    }
}
