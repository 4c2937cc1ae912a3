use clap::{Arg, Command};
use std::path::PathBuf;

pub const NAME: &str = "rotate";

pub const ARG_BACKUP_DIR: &str = "backup-dir";
pub const ARG_AUDIT_LOG: &str = "audit-log";

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Replace ADMIN_API_KEY in the configuration file with a fresh secret")
        .arg(super::config_arg())
        .arg(
            Arg::new(ARG_BACKUP_DIR)
                .long(ARG_BACKUP_DIR)
                .help("Backup directory [default: <config dir>/backups]")
                .env("KEYGATE_BACKUP_DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_AUDIT_LOG)
                .long(ARG_AUDIT_LOG)
                .help("Audit log file [default: <config dir>/rotation.log]")
                .env("KEYGATE_AUDIT_LOG")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub config: PathBuf,
    pub backup_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            config: super::config_path(matches),
            backup_dir: matches.get_one::<PathBuf>(ARG_BACKUP_DIR).cloned(),
            audit_log: matches.get_one::<PathBuf>(ARG_AUDIT_LOG).cloned(),
        }
    }
}
