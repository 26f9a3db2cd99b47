//! In-memory storage backends
//!
//! Process-local stand-ins for the external stores, suitable for tests and
//! single-node development. Both are safe to share across tasks.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    Error,
    clock::{Clock, SystemClock},
    error::{AuthError, StorageError},
    identity::{Identity, IdentityId, NewIdentity},
};

use super::{IdentityStore, TokenStore};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// [`TokenStore`] backed by a [`DashMap`].
///
/// `get_and_delete` is a single `DashMap::remove`, which holds the shard lock
/// for the read and the removal, so exactly one concurrent caller wins.
pub struct MemoryTokenStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries held, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        let now = self.clock.now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().expires_at <= now => {
                occupied.insert(stored);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, Error> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, stored)| stored.expires_at > now)
            .map(|(_, stored)| stored.value))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.value.clone()))
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = self.clock.now();
        let mut purged = 0u64;
        self.entries.retain(|_, stored| {
            let live = stored.expires_at > now;
            if !live {
                purged += 1;
            }
            live
        });
        Ok(purged)
    }
}

/// [`IdentityStore`] backed by a [`DashMap`] keyed by id.
///
/// Writes are serialized so email and username uniqueness hold.
pub struct MemoryIdentityStore {
    identities: DashMap<IdentityId, Identity>,
    write_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            identities: DashMap::new(),
            write_lock: Mutex::new(()),
            clock,
        }
    }

    fn conflicts(&self, identity_id: &IdentityId, email: &str, username: &str) -> Option<Error> {
        self.identities
            .iter()
            .filter(|existing| existing.id != *identity_id)
            .find_map(|existing| {
                if existing.email == email {
                    Some(AuthError::IdentityAlreadyExists.into())
                } else if existing.username == username {
                    Some(AuthError::UsernameTaken.into())
                } else {
                    None
                }
            })
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create(&self, identity: NewIdentity) -> Result<Identity, Error> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.identities.contains_key(&identity.id) {
            return Err(StorageError::Constraint(format!(
                "identity {} already exists",
                identity.id
            ))
            .into());
        }
        if let Some(conflict) = self.conflicts(&identity.id, &identity.email, &identity.username) {
            return Err(conflict);
        }

        let identity = identity.into_identity(self.clock.now());
        self.identities
            .insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, Error> {
        Ok(self.identities.get(id).map(|identity| identity.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        Ok(self
            .identities
            .iter()
            .find(|identity| identity.email == email)
            .map(|identity| identity.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, Error> {
        Ok(self
            .identities
            .iter()
            .find(|identity| identity.username == username)
            .map(|identity| identity.clone()))
    }

    async fn find_all(&self) -> Result<Vec<Identity>, Error> {
        let mut all: Vec<Identity> = self
            .identities
            .iter()
            .map(|identity| identity.clone())
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_str().cmp(b.id.as_str())));
        Ok(all)
    }

    async fn update(&self, identity: &Identity) -> Result<Identity, Error> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if !self.identities.contains_key(&identity.id) {
            return Err(StorageError::NotFound.into());
        }
        if let Some(conflict) = self.conflicts(&identity.id, &identity.email, &identity.username) {
            return Err(conflict);
        }

        let mut updated = identity.clone();
        updated.updated_at = self.clock.now();
        self.identities.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), Error> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.identities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound.into())
    }
}
