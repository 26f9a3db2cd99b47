//! SQLite storage backend for latchkey
//!
//! Provides [`SqliteTokenStore`] and [`SqliteIdentityStore`] over a shared
//! [`SqlitePool`]. Call [`SqliteBackend::migrate`] once before use.
//!
//! ```rust,ignore
//! use latchkey_storage_sqlite::SqliteBackend;
//!
//! let backend = SqliteBackend::connect("sqlite://latchkey.db?mode=rwc").await?;
//! backend.migrate().await?;
//!
//! let tokens = backend.token_store();
//! let identities = backend.identity_store();
//! ```
mod identity_store;
pub mod migrations;
mod token_store;

use std::sync::Arc;

use latchkey_core::{
    Error,
    clock::{Clock, SystemClock},
    error::StorageError,
};
use sqlx::SqlitePool;

pub use identity_store::SqliteIdentityStore;
pub use token_store::SqliteTokenStore;

use migrations::{MIGRATIONS, SqliteMigrationManager};

pub struct SqliteBackend {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| map_sqlx_err(e, "Failed to connect to SQLite"))?;
        Ok(Self::new(pool))
    }

    /// Clock used for expiry and record timestamps by stores created afterwards.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
        })?;
        manager.up(MIGRATIONS).await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
        })?;
        Ok(())
    }

    pub fn token_store(&self) -> SqliteTokenStore {
        SqliteTokenStore::with_clock(self.pool.clone(), Arc::clone(&self.clock))
    }

    pub fn identity_store(&self) -> SqliteIdentityStore {
        SqliteIdentityStore::with_clock(self.pool.clone(), Arc::clone(&self.clock))
    }
}

/// Connection-level failures are reported as unavailable so callers treat
/// them like a timeout; everything else is a database error.
pub(crate) fn map_sqlx_err(e: sqlx::Error, context: &str) -> Error {
    tracing::error!(error = %e, "{context}");
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => {
            StorageError::Unavailable(format!("{context}: {e}")).into()
        }
        e => StorageError::Database(format!("{context}: {e}")).into(),
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create pool");
    SqliteBackend::new(pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations");
    pool
}
