//! Storage seams
//!
//! Latchkey owns no persistence. It talks to two external stores through narrow
//! traits:
//!
//! - [`TokenStore`]: a shared, TTL-capable key/value store (Redis-like) holding
//!   single-use magic link records.
//! - [`IdentityStore`]: the durable source of truth for identity records.
//!
//! In-memory implementations live in [`memory`]; the SQLite backend lives in
//! the `latchkey-storage-sqlite` crate.

pub mod memory;

use std::future::Future;

use async_trait::async_trait;
use chrono::Duration;

use crate::{
    Error,
    error::StorageError,
    identity::{Identity, IdentityId, NewIdentity},
};

pub use memory::{MemoryIdentityStore, MemoryTokenStore};

/// A shared key/value store whose entries carry a TTL.
///
/// Entries past their TTL must behave as absent for every operation.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Insert `value` under `key` unless a live entry already exists.
    ///
    /// Returns `true` if the entry was written, `false` if the key was taken.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error>;

    /// Atomically read and remove `key`.
    ///
    /// Out of any number of concurrent callers for the same key, at most one
    /// observes `Some`. Implementations must do this in a single round trip
    /// (`GETDEL`, `DELETE … RETURNING`, a shard lock), never as a client-side
    /// get followed by a delete.
    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, Error>;

    /// Non-destructive read. Diagnostics only; never part of the consume path.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Drop every entry past its TTL, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, Error>;
}

/// The external source of truth for identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    async fn create(&self, identity: NewIdentity) -> Result<Identity, Error>;

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, Error>;

    async fn find_all(&self) -> Result<Vec<Identity>, Error>;

    /// Overwrite the record with the same id. `StorageError::NotFound` if absent.
    async fn update(&self, identity: &Identity) -> Result<Identity, Error>;

    /// `StorageError::NotFound` if absent.
    async fn delete(&self, id: &IdentityId) -> Result<(), Error>;
}

/// Bound a store call by `timeout`, reporting an elapsed deadline as
/// [`StorageError::Unavailable`].
///
/// A timeout says nothing about whether the store applied the operation.
pub async fn with_timeout<T, F>(timeout: std::time::Duration, operation: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Unavailable(format!(
            "store did not respond within {}ms",
            timeout.as_millis()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_through_result() {
        let result = with_timeout(std::time::Duration::from_millis(50), async {
            Ok::<_, Error>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_reports_unavailable() {
        let result: Result<(), Error> = with_timeout(std::time::Duration::from_millis(20), async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::Unavailable(_)))
        ));
    }
}
