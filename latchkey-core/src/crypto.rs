//! Token generation and at-rest hashing
//!
//! Magic link tokens are 256-bit random values handed to the user exactly once,
//! inside the link. The store only ever sees `SHA256(token)`, so reading the
//! store does not yield usable credentials.
//!
//! SHA256 rather than a password hash is sufficient here: with 256 bits of
//! entropy a brute-force preimage search is infeasible.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Number of random bytes in a generated token.
pub const TOKEN_BYTES: usize = 32;

/// Generate a cryptographically secure random token.
///
/// 256 bits from the OS RNG, URL-safe base64 without padding (43 characters),
/// so the token can be embedded in a query string as is.
///
/// # Panics
///
/// Panics if the OS random number generator fails. There is no safe fallback
/// for credential material.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA256 of a token, used as its lookup key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a token for logs: first and last four characters only.
pub fn mask_token(token: &str) -> String {
    if token.len() < 12 || !token.is_ascii() {
        return "****".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}
