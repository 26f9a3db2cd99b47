use std::sync::Arc;

use crate::{
    Error,
    clock::Clock,
    crypto::mask_token,
    error::{MagicLinkError, utilities::SerdeResultExt},
    storage::{TokenStore, with_timeout},
};

use super::{DEFAULT_STORE_TIMEOUT, MagicLinkRecord, MagicToken, store_key};

/// Longest token accepted before touching the store.
const MAX_TOKEN_LEN: usize = 256;

/// Consumes magic link tokens, each at most once.
///
/// # Unknown outcomes
///
/// `verify` is not retryable. If the store removed the record but the reply
/// was lost (timeout, dropped connection, cancelled request), the token is
/// gone and a retry reports [`MagicLinkError::TokenInvalidOrConsumed`]. The
/// user has to request a new link. That cost is accepted in exchange for
/// replay-free consumption; a store timeout is surfaced as
/// `StorageError::Unavailable` and never treated as success.
pub struct MagicLinkVerifier<S: TokenStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    store_timeout: std::time::Duration,
}

impl<S: TokenStore> MagicLinkVerifier<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Consume `token` and return the email it authenticates.
    pub async fn verify(&self, token: &str) -> Result<String, Error> {
        self.consume(token).await.map(|consumed| consumed.email)
    }

    /// Consume `token`, returning the full record marked as used.
    ///
    /// The record is removed from the store before its expiry is checked, so
    /// an expired token is gone after this call whatever the outcome.
    pub async fn consume(&self, token: &str) -> Result<MagicToken, Error> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            tracing::warn!("Rejected magic link token with invalid length");
            return Err(MagicLinkError::TokenInvalidOrConsumed.into());
        }

        let removed = with_timeout(
            self.store_timeout,
            self.store.get_and_delete(&store_key(token)),
        )
        .await?;

        let Some(value) = removed else {
            tracing::warn!(
                token = %mask_token(token),
                "Magic link token invalid or already consumed"
            );
            return Err(MagicLinkError::TokenInvalidOrConsumed.into());
        };

        let record: MagicLinkRecord = serde_json::from_str(&value).map_serde_err()?;
        let magic = MagicToken::from_record(token.to_string(), record);
        let now = self.clock.now();

        if magic.is_expired_at(now) {
            tracing::warn!(
                token = %mask_token(token),
                email = %magic.email,
                expired_at = %magic.expires_at,
                "Magic link token expired"
            );
            return Err(MagicLinkError::TokenExpired.into());
        }

        tracing::info!(email = %magic.email, "Magic link token consumed");
        Ok(magic.mark_used(now))
    }

    /// Look at the record behind `token` without consuming it.
    ///
    /// Diagnostics only: the answer may be stale by the time it is returned.
    pub async fn peek(&self, token: &str) -> Result<Option<MagicToken>, Error> {
        let value = with_timeout(self.store_timeout, self.store.get(&store_key(token))).await?;

        value
            .map(|value| {
                serde_json::from_str::<MagicLinkRecord>(&value)
                    .map_serde_err()
                    .map(|record| MagicToken::from_record(token.to_string(), record))
            })
            .transpose()
    }
}
