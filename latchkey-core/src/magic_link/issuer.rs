use std::sync::Arc;

use chrono::Duration;

use crate::{
    Error,
    clock::Clock,
    crypto::{generate_secure_token, mask_token},
    error::{MagicLinkError, utilities::SerdeResultExt},
    storage::{TokenStore, with_timeout},
    validation::validate_email,
};

use super::{
    DEFAULT_EXPIRED_TOKEN_RETENTION, DEFAULT_MAGIC_LINK_TTL, DEFAULT_STORE_TIMEOUT,
    MagicLinkRecord, MagicToken, store_key,
};

/// Collisions at 256 bits do not happen in practice; the bound only keeps a
/// broken generator from looping forever.
const MAX_GENERATION_ATTEMPTS: usize = 5;

/// Minimum time a link outlives `expires_at` in the store, so a token
/// presented at exactly its expiry is still found.
const MIN_STORE_GRACE: Duration = Duration::seconds(1);

/// Creates single-use magic link tokens bound to an email address.
pub struct MagicLinkIssuer<S: TokenStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retention: Duration,
    store_timeout: std::time::Duration,
    generate_token: fn() -> String,
}

impl<S: TokenStore> MagicLinkIssuer<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: DEFAULT_MAGIC_LINK_TTL,
            retention: DEFAULT_EXPIRED_TOKEN_RETENTION,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            generate_token: generate_secure_token,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Replace the token source. Tokens must be URL-safe.
    pub fn with_token_generator(mut self, generate_token: fn() -> String) -> Self {
        self.generate_token = generate_token;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new token for `email`, valid until `now + ttl`.
    ///
    /// Safe to retry after an unknown outcome: each call writes a fresh key
    /// with `put_if_absent`, so a retry yields a second independent token and
    /// never overwrites the first.
    pub async fn issue(&self, email: &str) -> Result<MagicToken, Error> {
        validate_email(email)?;

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let token = (self.generate_token)();
            let now = self.clock.now();
            let record = MagicLinkRecord {
                email: email.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            };
            let value = serde_json::to_string(&record).map_serde_err()?;

            let store_ttl = self.ttl + self.retention.max(MIN_STORE_GRACE);
            let inserted = with_timeout(
                self.store_timeout,
                self.store.put_if_absent(&store_key(&token), &value, store_ttl),
            )
            .await?;

            if inserted {
                tracing::info!(
                    email = %email,
                    token = %mask_token(&token),
                    expires_at = %record.expires_at,
                    "Issued magic link token"
                );
                return Ok(MagicToken::from_record(token, record));
            }

            tracing::warn!(attempt, "Magic link token collision, regenerating");
        }

        tracing::error!(email = %email, "Exhausted magic link token generation attempts");
        Err(MagicLinkError::TokenGenerationFailed.into())
    }
}
