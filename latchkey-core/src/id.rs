//! Prefixed identifiers
//!
//! Ids look like `idn_8mFq0S3xk1u2yXnL`: a short type prefix, an underscore and
//! 96 bits of URL-safe randomness.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

const ID_BYTES: usize = 12;

pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    BASE64_URL_SAFE_NO_PAD
        .decode(random_part)
        .is_ok_and(|decoded| decoded.len() >= ID_BYTES)
}
