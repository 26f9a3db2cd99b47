//! SQLite implementation of [`TokenStore`]
//!
//! Expiry is stored as milliseconds since the Unix epoch. Consuming a key is a
//! single `DELETE … RETURNING` statement, so of any number of concurrent
//! callers only the one whose statement removed the row sees its value.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use latchkey_core::{
    Error,
    clock::{Clock, SystemClock},
    storage::TokenStore,
};
use sqlx::SqlitePool;

use crate::map_sqlx_err;

pub struct SqliteTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        let now = self.now_millis();
        let expires_at = now + ttl.num_milliseconds();

        // An expired row is replaced in place; a live one leaves the upsert a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO token_store (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE
                SET value = excluded.value, expires_at = excluded.expires_at
                WHERE token_store.expires_at <= ?4
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to write token"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, Error> {
        let value: Option<String> = sqlx::query_scalar(
            "DELETE FROM token_store WHERE key = ?1 AND expires_at > ?2 RETURNING value",
        )
        .bind(key)
        .bind(self.now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to consume token"))?;

        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM token_store WHERE key = ?1 AND expires_at > ?2")
                .bind(key)
                .bind(self.now_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_err(e, "Failed to read token"))?;

        Ok(value)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM token_store WHERE expires_at <= ?1")
            .bind(self.now_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_err(e, "Failed to purge expired tokens"))?;

        Ok(result.rows_affected())
    }
}
