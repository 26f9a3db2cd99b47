//! Cache-aside layer in front of an [`IdentityStore`]
//!
//! Reads are served from an in-process map when a live entry exists, otherwise
//! they load from the store and populate the entry under the query key. Writes
//! go to the store first and then evict every entry holding the written
//! identity, whatever key it was cached under, along with the id, email and
//! username keys of the record as written and the bulk `all` key. Keys from an
//! email or username the record no longer has are found by the id they hold,
//! so no pre-write read of the old record is needed. Eviction runs whether or
//! not the store call succeeded: a timed out write may still have committed.
//! The write path never populates.
//!
//! A reader that started loading before a write committed must not publish what
//! it loaded. Every eviction bumps a generation counter; a reader only
//! publishes if the generation it observed before loading is still current.
//! The check and the insert happen under a shared guard that evictions take
//! exclusively, so a load can never land between an eviction and the bump.

use std::{
    future::Future,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::{
    Error,
    clock::Clock,
    identity::{Identity, IdentityId, NewIdentity},
    storage::{IdentityStore, with_timeout},
};

pub const DEFAULT_IDENTITY_CACHE_TTL: Duration = Duration::minutes(5);

const DEFAULT_READ_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(IdentityId),
    Email(String),
    Username(String),
    All,
}

impl CacheKey {
    /// Every key that can resolve to `identity`, in eviction order.
    pub fn for_identity(identity: &Identity) -> [CacheKey; 4] {
        [
            CacheKey::Id(identity.id.clone()),
            CacheKey::Email(identity.email.clone()),
            CacheKey::Username(identity.username.clone()),
            CacheKey::All,
        ]
    }
}

#[derive(Debug, Clone)]
enum Cached {
    One(Identity),
    All(Vec<Identity>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Cached,
    expires_at: DateTime<Utc>,
}

pub struct IdentityCache<I: IdentityStore> {
    store: Arc<I>,
    entries: DashMap<CacheKey, CacheEntry>,
    generation: AtomicU64,
    publish_guard: RwLock<()>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    store_timeout: std::time::Duration,
    read_attempts: u32,
}

impl<I: IdentityStore> IdentityCache<I> {
    pub fn new(store: Arc<I>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            publish_guard: RwLock::new(()),
            clock,
            ttl: DEFAULT_IDENTITY_CACHE_TTL,
            store_timeout: crate::magic_link::DEFAULT_STORE_TIMEOUT,
            read_attempts: DEFAULT_READ_ATTEMPTS,
        }
    }

    /// Entry lifetime. Bounds how long a missed eviction can serve stale data.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// How many times a read is attempted when the store is unavailable.
    pub fn with_read_attempts(mut self, attempts: u32) -> Self {
        self.read_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<I> {
        &self.store
    }

    /// Number of cached entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Evict every key derived from `identity` and every entry holding its id.
    pub fn invalidate(&self, identity: &Identity) {
        self.evict(&identity.id, &CacheKey::for_identity(identity));
    }

    /// Drop `keys`, the bulk listing, and any entry whose identity is `id`.
    fn evict(&self, id: &IdentityId, keys: &[CacheKey]) {
        let _guard = self.publish_guard.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|key, entry| {
            if *key == CacheKey::All || keys.contains(key) {
                return false;
            }
            match &entry.value {
                Cached::One(identity) => identity.id != *id,
                Cached::All(_) => false,
            }
        });
        tracing::debug!(identity_id = %id, "Evicted identity cache keys");
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _guard = self.publish_guard.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    fn lookup(&self, key: &CacheKey) -> Option<Cached> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.expires_at > now {
            return Some(entry.value.clone());
        }
        drop(entry);
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    fn publish(&self, key: CacheKey, value: Cached, observed_generation: u64) {
        let _guard = self.publish_guard.read().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != observed_generation {
            tracing::debug!(?key, "Skipping cache fill, identity written during load");
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: self.clock.now() + self.ttl,
            },
        );
    }

    async fn read_with_retry<T, F, Fut>(&self, load: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 1;
        loop {
            match with_timeout(self.store_timeout, load()).await {
                Err(e) if e.is_retryable() && attempt < self.read_attempts => {
                    tracing::warn!(attempt, error = %e, "Identity store read failed, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn read_one<F, Fut>(&self, key: CacheKey, load: F) -> Result<Option<Identity>, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<Identity>, Error>>,
    {
        if let Some(Cached::One(identity)) = self.lookup(&key) {
            tracing::debug!(?key, "Identity cache hit");
            return Ok(Some(identity));
        }

        tracing::debug!(?key, "Identity cache miss");
        let observed = self.generation.load(Ordering::SeqCst);
        let loaded = self.read_with_retry(load).await?;
        if let Some(identity) = &loaded {
            self.publish(key, Cached::One(identity.clone()), observed);
        }
        Ok(loaded)
    }

    pub async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, Error> {
        self.read_one(CacheKey::Id(id.clone()), || self.store.find_by_id(id))
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        self.read_one(CacheKey::Email(email.to_string()), || {
            self.store.find_by_email(email)
        })
        .await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, Error> {
        self.read_one(CacheKey::Username(username.to_string()), || {
            self.store.find_by_username(username)
        })
        .await
    }

    pub async fn find_all(&self) -> Result<Vec<Identity>, Error> {
        if let Some(Cached::All(identities)) = self.lookup(&CacheKey::All) {
            tracing::debug!("Identity cache hit for all identities");
            return Ok(identities);
        }

        let observed = self.generation.load(Ordering::SeqCst);
        let loaded = self.read_with_retry(|| self.store.find_all()).await?;
        self.publish(CacheKey::All, Cached::All(loaded.clone()), observed);
        Ok(loaded)
    }

    pub async fn create(&self, identity: NewIdentity) -> Result<Identity, Error> {
        let id = identity.id.clone();
        let keys = [
            CacheKey::Id(identity.id.clone()),
            CacheKey::Email(identity.email.clone()),
            CacheKey::Username(identity.username.clone()),
        ];
        let result = with_timeout(self.store_timeout, self.store.create(identity)).await;
        self.evict(&id, &keys);
        result
    }

    /// Write `identity` to the store, then evict its keys and every entry
    /// still holding an earlier version of it.
    pub async fn update(&self, identity: &Identity) -> Result<Identity, Error> {
        let result = with_timeout(self.store_timeout, self.store.update(identity)).await;
        self.invalidate(identity);
        result
    }

    pub async fn delete(&self, id: &IdentityId) -> Result<(), Error> {
        let result = with_timeout(self.store_timeout, self.store.delete(id)).await;
        self.evict(id, &[CacheKey::Id(id.clone())]);
        result
    }
}

#[async_trait]
impl<I: IdentityStore> IdentityStore for IdentityCache<I> {
    async fn create(&self, identity: NewIdentity) -> Result<Identity, Error> {
        IdentityCache::create(self, identity).await
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, Error> {
        IdentityCache::find_by_id(self, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        IdentityCache::find_by_email(self, email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, Error> {
        IdentityCache::find_by_username(self, username).await
    }

    async fn find_all(&self) -> Result<Vec<Identity>, Error> {
        IdentityCache::find_all(self).await
    }

    async fn update(&self, identity: &Identity) -> Result<Identity, Error> {
        IdentityCache::update(self, identity).await
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), Error> {
        IdentityCache::delete(self, id).await
    }
}
