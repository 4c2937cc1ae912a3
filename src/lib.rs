//! # Keygate (Admin Gateway & Key Rotation)
//!
//! `keygate` fronts a managed identity provider with a tiny administrative HTTP
//! surface and ships the offline tool that rotates the secret protecting it.
//!
//! ## Admin Gateway
//!
//! Every admin route requires `Authorization: Bearer <ADMIN_API_KEY>`. The secret is
//! loaded once at startup from the configuration file and compared in constant time.
//! Free-text fields are sanitized before they are used to build identifiers or are
//! forwarded to the provider. User lifecycle calls (create, reset password, delete,
//! MFA notice) are pass-through: the provider owns accounts, password hashing and MFA.
//!
//! User creation writes twice (identity record, then the `users` metadata row). When
//! the second write fails the identity record is deleted again so both stores stay
//! aligned.
//!
//! ## Key Rotation
//!
//! `keygate rotate` replaces `ADMIN_API_KEY` in the configuration file with a fresh
//! 256-bit secret. The previous file is copied to a timestamped backup first and each
//! rotation appends one redacted audit entry. Only a 6-character prefix of any secret
//! is ever displayed or logged. A lock file next to the configuration keeps two
//! rotations from interleaving.

pub mod cli;
pub mod config_file;
pub mod gateway;
pub mod provider;
pub mod rotation;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Key holding the admin secret in the configuration file.
pub const ADMIN_KEY_NAME: &str = "ADMIN_API_KEY";
