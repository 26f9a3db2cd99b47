use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use latchkey_core::{
    Error, Identity, IdentityId, NewIdentity, Role,
    clock::{Clock, SystemClock},
    error::{AuthError, StorageError},
    storage::IdentityStore,
};
use sqlx::SqlitePool;

use crate::map_sqlx_err;

pub struct SqliteIdentityStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteIdentity {
    id: String,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    role: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteIdentity> for Identity {
    type Error = Error;

    fn try_from(row: SqliteIdentity) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Identity {
            id: IdentityId::new(&row.id),
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Serialization(format!("Invalid timestamp: {millis}")).into())
}

/// Unique violations name the offending column; turn them into the matching
/// identity conflict.
fn map_write_err(e: sqlx::Error, context: &str) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = db.message();
            if message.contains("identities.email") {
                return AuthError::IdentityAlreadyExists.into();
            }
            if message.contains("identities.username") {
                return AuthError::UsernameTaken.into();
            }
            return StorageError::Constraint(message.to_string()).into();
        }
    }
    map_sqlx_err(e, context)
}

const COLUMNS: &str = "id, email, username, first_name, last_name, role, created_at, updated_at";

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn create(&self, identity: NewIdentity) -> Result<Identity, Error> {
        let now = self.clock.now().timestamp_millis();

        let row = sqlx::query_as::<_, SqliteIdentity>(&format!(
            r#"
            INSERT INTO identities ({COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identity.id.as_str())
        .bind(&identity.email)
        .bind(&identity.username)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_err(e, "Failed to create identity"))?;

        row.try_into()
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, Error> {
        let row = sqlx::query_as::<_, SqliteIdentity>(&format!(
            "SELECT {COLUMNS} FROM identities WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to find identity by id"))?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        let row = sqlx::query_as::<_, SqliteIdentity>(&format!(
            "SELECT {COLUMNS} FROM identities WHERE email = ?1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to find identity by email"))?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, Error> {
        let row = sqlx::query_as::<_, SqliteIdentity>(&format!(
            "SELECT {COLUMNS} FROM identities WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to find identity by username"))?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Identity>, Error> {
        let rows = sqlx::query_as::<_, SqliteIdentity>(&format!(
            "SELECT {COLUMNS} FROM identities ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, "Failed to list identities"))?;

        rows.into_iter().map(Identity::try_from).collect()
    }

    async fn update(&self, identity: &Identity) -> Result<Identity, Error> {
        let now = self.clock.now().timestamp_millis();

        let row = sqlx::query_as::<_, SqliteIdentity>(&format!(
            r#"
            UPDATE identities
            SET email = ?2, username = ?3, first_name = ?4, last_name = ?5, role = ?6, updated_at = ?7
            WHERE id = ?1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identity.id.as_str())
        .bind(&identity.email)
        .bind(&identity.username)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.role.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_err(e, "Failed to update identity"))?
        .ok_or(StorageError::NotFound)?;

        row.try_into()
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM identities WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_err(e, "Failed to delete identity"))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }
}
