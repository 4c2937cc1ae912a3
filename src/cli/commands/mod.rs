pub mod logging;
pub mod rotate;
pub mod serve;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

pub const ARG_CONFIG: &str = "config";
pub const DEFAULT_CONFIG: &str = ".env";

/// `--config`, shared by both subcommands.
#[must_use]
pub fn config_arg() -> Arg {
    Arg::new(ARG_CONFIG)
        .short('c')
        .long(ARG_CONFIG)
        .help("Configuration file holding ADMIN_API_KEY")
        .env("KEYGATE_CONFIG")
        .default_value(DEFAULT_CONFIG)
        .value_parser(clap::value_parser!(PathBuf))
}

pub(crate) fn config_path(matches: &clap::ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>(ARG_CONFIG)
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("keygate")
        .about("Admin gateway for a managed identity provider")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(serve::command())
        .subcommand(rotate::command());

    logging::with_args(command)
}
