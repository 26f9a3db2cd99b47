//! Signed session tokens
//!
//! Session tokens are compact JWTs (`header.claims.signature`) carrying:
//!
//! | Claim  | Type      | Description                                   |
//! | ------ | --------- | --------------------------------------------- |
//! | `sub`  | `String`  | The identity's email address.                 |
//! | `iat`  | `i64`     | Issued-at, seconds since the Unix epoch.      |
//! | `exp`  | `i64`     | Expiry, seconds since the Unix epoch.         |
//! | `role` | `String`  | `USER` or `ADMIN`.                            |
//! | `iss`  | `String`  | Optional issuer.                              |
//! | extra  | any       | Optional additional claims, flattened in.     |
//!
//! Nothing is stored server side. Validity is a pure function of the token
//! bytes, the current [`SigningKey`] and the clock, and expiry is the only
//! revocation mechanism. Rotating the key invalidates every token signed with
//! the previous one.

mod key;
mod service;

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{crypto::mask_token, identity::Role};

pub use key::{MIN_HS256_SECRET_LEN, SigningKey};
pub use service::{DEFAULT_SESSION_TTL, SessionTokenService};

/// Additional claims carried next to the registered ones.
pub type ExtraClaims = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the identity's email.
    pub sub: String,
    /// Issued at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraClaims,
}

impl SessionClaims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Expired once `now` is strictly past `exp`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// A signed session token as handed to the client.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Value for an `Authorization` header.
    pub fn to_bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken")
            .field(&mask_token(&self.0))
            .finish()
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the credential from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
///
/// ```rust
/// use latchkey_core::session::bearer_token;
///
/// assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
/// assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
/// ```
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
