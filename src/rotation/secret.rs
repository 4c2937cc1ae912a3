use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use std::fmt::Write;

/// 256 bits of entropy.
pub const SECRET_BYTES: usize = 32;

/// Number of leading characters of a secret that may be displayed or logged.
pub const PREFIX_LEN: usize = 6;

/// Generate a new admin secret: 32 bytes from the OS CSPRNG, lowercase hex.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_secret() -> Result<SecretString, rand::Error> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;

    let hex = bytes
        .iter()
        .fold(String::with_capacity(SECRET_BYTES * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        });
    bytes.fill(0);

    Ok(SecretString::from(hex))
}

/// First [`PREFIX_LEN`] characters followed by `...`.
#[must_use]
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(PREFIX_LEN).collect();
    format!("{prefix}...")
}
