//! Single-use magic link tokens
//!
//! A magic link authenticates an email address without a password. The
//! lifecycle of a token is:
//!
//! 1. [`MagicLinkIssuer::issue`] generates 256 random bits, writes a
//!    [`MagicLinkRecord`] to the [`TokenStore`](crate::storage::TokenStore)
//!    with `put_if_absent`, and hands the raw token back for the link.
//! 2. [`MagicLinkVerifier::verify`] removes the record with `get_and_delete`
//!    and only then checks the recorded expiry. The atomic removal is what
//!    makes a token consumable at most once.
//! 3. Records that are never presented are dropped by the store's TTL or by
//!    [`TokenStore::purge_expired`](crate::storage::TokenStore::purge_expired).
//!
//! Store entries live for `ttl + retention`, so a token presented after its
//! logical expiry is still found and reported as expired rather than unknown.

mod issuer;
mod verifier;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{hash_token, mask_token};

pub use issuer::MagicLinkIssuer;
pub use verifier::MagicLinkVerifier;

/// Default lifetime of a magic link.
pub const DEFAULT_MAGIC_LINK_TTL: Duration = Duration::minutes(15);

/// Default time an expired record is kept so it can be reported as expired.
pub const DEFAULT_EXPIRED_TOKEN_RETENTION: Duration = Duration::hours(1);

/// Default per-call deadline for token store round trips.
pub const DEFAULT_STORE_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

const KEY_PREFIX: &str = "magic_link:";

/// Store key for a token. Only the hash of the token is ever written.
pub fn store_key(token: &str) -> String {
    format!("{KEY_PREFIX}{}", hash_token(token))
}

/// The value persisted under [`store_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkRecord {
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A magic link token together with the record it resolves to.
#[derive(Clone, PartialEq, Eq)]
pub struct MagicToken {
    pub token: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl MagicToken {
    pub fn from_record(token: String, record: MagicLinkRecord) -> Self {
        Self {
            token,
            email: record.email,
            created_at: record.created_at,
            expires_at: record.expires_at,
            used_at: None,
        }
    }

    pub fn used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `{base_url}/auth/verify?token={token}`
    pub fn link(&self, base_url: &str) -> String {
        format!(
            "{}/auth/verify?token={}",
            base_url.trim_end_matches('/'),
            self.token
        )
    }

    fn mark_used(mut self, at: DateTime<Utc>) -> Self {
        self.used_at = Some(at);
        self
    }
}

impl fmt::Debug for MagicToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MagicToken")
            .field("token", &mask_token(&self.token))
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("used_at", &self.used_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: DateTime<Utc>) -> MagicToken {
        MagicToken::from_record(
            "abcdefghijklmnopqrstuvwxyz".to_string(),
            MagicLinkRecord {
                email: "a@x.com".to_string(),
                created_at: expires_at - DEFAULT_MAGIC_LINK_TTL,
                expires_at,
            },
        )
    }

    #[test]
    fn test_store_key_hides_token() {
        let key = store_key("secret-token-value");
        assert!(key.starts_with("magic_link:"));
        assert!(!key.contains("secret-token-value"));
        assert_eq!(key, store_key("secret-token-value"));
    }

    #[test]
    fn test_link_format() {
        let magic = token(Utc::now());
        assert_eq!(
            magic.link("https://blog.example.com/"),
            "https://blog.example.com/auth/verify?token=abcdefghijklmnopqrstuvwxyz"
        );
        assert_eq!(
            magic.link("http://localhost:3000"),
            "http://localhost:3000/auth/verify?token=abcdefghijklmnopqrstuvwxyz"
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let expires_at = Utc::now();
        let magic = token(expires_at);

        assert!(!magic.is_expired_at(expires_at));
        assert!(magic.is_expired_at(expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_debug_masks_token() {
        let rendered = format!("{:?}", token(Utc::now()));
        assert!(rendered.contains("abcd...wxyz"));
        assert!(!rendered.contains("abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn test_mark_used() {
        let now = Utc::now();
        let magic = token(now);
        assert!(!magic.used());
        assert_eq!(magic.mark_used(now).used_at, Some(now));
    }
}
