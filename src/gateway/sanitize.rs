//! Input sanitation and temporary password generation.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;

/// Characters stripped from every user-supplied field.
pub const FORBIDDEN_CHARS: [char; 7] = ['<', '>', ';', '\'', '"', '/', '\\'];

/// Random bytes behind a temporary password (16 base64url characters).
pub const TEMPORARY_PASSWORD_BYTES: usize = 12;

/// Remove [`FORBIDDEN_CHARS`] and trim surrounding whitespace. Missing input becomes `""`.
#[must_use]
pub fn sanitize(value: Option<&str>) -> String {
    let cleaned: String = value
        .unwrap_or_default()
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect();
    cleaned.trim().to_string()
}

/// Password handed out by an operator-initiated reset. Never persisted here.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_temporary_password() -> Result<SecretString, rand::Error> {
    let mut bytes = [0u8; TEMPORARY_PASSWORD_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    let password = Base64UrlUnpadded::encode_string(&bytes);
    bytes.fill(0);
    Ok(SecretString::from(password))
}
