//! Builder for [`AuthOrchestrator`]
//!
//! Storage has to be chosen before [`build`](AuthOrchestratorBuilder::build)
//! becomes available.
//!
//! ```rust,no_run
//! use latchkey::{AuthConfig, AuthOrchestratorBuilder, SigningKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), latchkey::Error> {
//!     let auth = AuthOrchestratorBuilder::new()
//!         .config(AuthConfig::from_env()?)
//!         .signing_key(SigningKey::from_env()?)
//!         .with_sqlite("sqlite://latchkey.db?mode=rwc")
//!         .await?
//!         .build()?;
//!
//!     let issued = auth.request_login("user@example.com").await?;
//!     println!("link valid until {}", issued.expires_at);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use latchkey_core::{
    Clock, Error, IdentityStore, MagicLinkMailer, MemoryIdentityStore, MemoryTokenStore,
    SigningKey, SystemClock, TokenStore, TracingMailer,
};

use crate::{AuthConfig, AuthOrchestrator};

pub struct NoStorage;

pub struct WithStorage<S: TokenStore, I: IdentityStore> {
    tokens: Arc<S>,
    identities: Arc<I>,
}

pub struct AuthOrchestratorBuilder<Storage> {
    storage: Storage,
    config: AuthConfig,
    signing_key: Option<SigningKey>,
    mailer: Option<Arc<dyn MagicLinkMailer>>,
    clock: Arc<dyn Clock>,
}

impl Default for AuthOrchestratorBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthOrchestratorBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: AuthConfig::default(),
            signing_key: None,
            mailer: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_stores<S: TokenStore, I: IdentityStore>(
        self,
        tokens: Arc<S>,
        identities: Arc<I>,
    ) -> AuthOrchestratorBuilder<WithStorage<S, I>> {
        AuthOrchestratorBuilder {
            storage: WithStorage { tokens, identities },
            config: self.config,
            signing_key: self.signing_key,
            mailer: self.mailer,
            clock: self.clock,
        }
    }

    /// In-process stores sharing the builder's clock. Set the clock first.
    pub fn with_memory_stores(
        self,
    ) -> AuthOrchestratorBuilder<WithStorage<MemoryTokenStore, MemoryIdentityStore>> {
        let tokens = Arc::new(MemoryTokenStore::with_clock(Arc::clone(&self.clock)));
        let identities = Arc::new(MemoryIdentityStore::with_clock(Arc::clone(&self.clock)));
        self.with_stores(tokens, identities)
    }

    /// Connect to SQLite at `url` and apply migrations.
    #[cfg(feature = "sqlite")]
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        AuthOrchestratorBuilder<
            WithStorage<
                latchkey_storage_sqlite::SqliteTokenStore,
                latchkey_storage_sqlite::SqliteIdentityStore,
            >,
        >,
        Error,
    > {
        let backend = latchkey_storage_sqlite::SqliteBackend::connect(url)
            .await?
            .with_clock(Arc::clone(&self.clock));
        backend.migrate().await?;

        let tokens = Arc::new(backend.token_store());
        let identities = Arc::new(backend.identity_store());
        Ok(self.with_stores(tokens, identities))
    }
}

impl<Storage> AuthOrchestratorBuilder<Storage> {
    pub fn config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn MagicLinkMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<S: TokenStore, I: IdentityStore> AuthOrchestratorBuilder<WithStorage<S, I>> {
    /// Without an explicit key, `LATCHKEY_SIGNING_SECRET` is used, and failing
    /// that a random key that does not survive a restart. Without a mailer,
    /// links are only logged.
    pub fn build(self) -> Result<AuthOrchestrator<S, I>, Error> {
        let signing_key = match self.signing_key {
            Some(key) => key,
            None if std::env::var_os("LATCHKEY_SIGNING_SECRET").is_some() => SigningKey::from_env()?,
            None => {
                tracing::warn!("No signing key configured, sessions will not survive a restart");
                SigningKey::random_hs256()
            }
        };

        let mailer = self
            .mailer
            .unwrap_or_else(|| Arc::new(TracingMailer) as Arc<dyn MagicLinkMailer>);

        Ok(AuthOrchestrator::new(
            self.config,
            self.storage.tokens,
            self.storage.identities,
            signing_key,
            mailer,
            self.clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::ManualClock;

    #[tokio::test]
    async fn test_memory_stores_share_builder_clock() {
        let clock = ManualClock::default();
        let auth = AuthOrchestratorBuilder::new()
            .clock(Arc::new(clock.clone()))
            .signing_key(SigningKey::random_hs256())
            .with_memory_stores()
            .build()
            .unwrap();

        auth.token_store()
            .put_if_absent("k", "v", chrono::Duration::minutes(1))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(auth.token_store().get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_config_reaches_orchestrator() {
        let auth = AuthOrchestratorBuilder::new()
            .config(AuthConfig::default().with_base_url("https://app.test"))
            .signing_key(SigningKey::random_hs256())
            .with_memory_stores()
            .build()
            .unwrap();

        assert_eq!(auth.config().base_url, "https://app.test");
        assert_eq!(auth.sessions().ttl(), chrono::Duration::hours(24));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_with_sqlite_migrates() {
        let auth = AuthOrchestratorBuilder::new()
            .signing_key(SigningKey::random_hs256())
            .with_sqlite("sqlite::memory:")
            .await
            .unwrap()
            .build()
            .unwrap();

        assert!(auth.identities().find_all().await.unwrap().is_empty());
    }
}
