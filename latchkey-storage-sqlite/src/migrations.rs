//! Schema migrations for the SQLite backend
//!
//! Applied versions are recorded in `latchkey_migrations`; each pending
//! migration runs in its own transaction together with its bookkeeping row.

use chrono::Utc;
use latchkey_core::{Error, map_storage_err_with_context};
use sqlx::SqlitePool;

const MIGRATIONS_TABLE: &str = "latchkey_migrations";

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "CreateTokenStoreTable",
        up: r#"
            CREATE TABLE IF NOT EXISTS token_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_token_store_expires_at ON token_store(expires_at);
        "#,
    },
    Migration {
        version: 2,
        name: "CreateIdentitiesTable",
        up: r#"
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                username TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'USER',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(email),
                UNIQUE(username)
            );
        "#,
    },
];

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"#
        );
        map_storage_err_with_context!(
            sqlx::query(&sql).execute(&self.pool).await,
            "Failed to initialize migrations"
        )?;
        Ok(())
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, Error> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {MIGRATIONS_TABLE} WHERE version = ?)");
        let applied: bool = map_storage_err_with_context!(
            sqlx::query_scalar(&sql)
                .bind(version)
                .fetch_one(&self.pool)
                .await,
            "Failed to read migration state"
        )?;
        Ok(applied)
    }

    /// Versions already applied, ascending.
    pub async fn applied_versions(&self) -> Result<Vec<i64>, Error> {
        let sql = format!("SELECT version FROM {MIGRATIONS_TABLE} ORDER BY version");
        let versions = map_storage_err_with_context!(
            sqlx::query_scalar(&sql).fetch_all(&self.pool).await,
            "Failed to read migration state"
        )?;
        Ok(versions)
    }

    pub async fn up(&self, migrations: &[Migration]) -> Result<(), Error> {
        for migration in migrations {
            if self.is_applied(migration.version).await? {
                continue;
            }

            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );

            let mut tx = map_storage_err_with_context!(
                self.pool.begin().await,
                "Failed to begin migration"
            )?;

            map_storage_err_with_context!(
                sqlx::raw_sql(migration.up).execute(&mut *tx).await,
                migration.name
            )?;

            let record = format!(
                "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at) VALUES (?, ?, ?)"
            );
            map_storage_err_with_context!(
                sqlx::query(&record)
                    .bind(migration.version)
                    .bind(migration.name)
                    .bind(Utc::now().timestamp())
                    .execute(&mut *tx)
                    .await,
                migration.name
            )?;

            map_storage_err_with_context!(tx.commit().await, migration.name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool")
    }

    #[tokio::test]
    async fn test_up_applies_every_migration_once() {
        let manager = SqliteMigrationManager::new(pool().await);
        manager.initialize().await.unwrap();

        manager.up(MIGRATIONS).await.unwrap();
        manager.up(MIGRATIONS).await.unwrap();

        assert_eq!(manager.applied_versions().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_is_applied_before_and_after() {
        let manager = SqliteMigrationManager::new(pool().await);
        manager.initialize().await.unwrap();

        assert!(!manager.is_applied(1).await.unwrap());
        manager.up(&MIGRATIONS[..1]).await.unwrap();
        assert!(manager.is_applied(1).await.unwrap());
        assert!(!manager.is_applied(2).await.unwrap());
    }
}
