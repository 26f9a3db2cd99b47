#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use latchkey::{
    AuthConfig, AuthOrchestrator, AuthOrchestratorBuilder, Error, Identity, IdentityStore,
    MagicLinkMailer, ManualClock, MemoryIdentityStore, MemoryTokenStore, NewIdentity, SigningKey,
    TokenStore, error::StorageError,
};

pub const TEST_HS256_SECRET: &[u8] = b"this_is_a_test_secret_key_for_hs256_session_tokens_only";

#[derive(Debug, Clone)]
pub struct SentLink {
    pub to: String,
    pub link: String,
    pub user_name: Option<String>,
}

/// Mailer that keeps every link it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentLink>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentLink> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the most recent link sent to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|sent| sent.to == to)
            .and_then(|sent| token_from_link(&sent.link))
    }
}

#[async_trait]
impl MagicLinkMailer for RecordingMailer {
    async fn send_magic_link(
        &self,
        to: &str,
        magic_link: &str,
        user_name: Option<&str>,
    ) -> Result<(), Error> {
        self.sent.lock().unwrap().push(SentLink {
            to: to.to_string(),
            link: magic_link.to_string(),
            user_name: user_name.map(str::to_string),
        });
        Ok(())
    }
}

/// Mailer whose transport is always down.
pub struct FailingMailer;

#[async_trait]
impl MagicLinkMailer for FailingMailer {
    async fn send_magic_link(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), Error> {
        Err(StorageError::Unavailable("smtp relay refused connection".to_string()).into())
    }
}

pub fn token_from_link(link: &str) -> Option<String> {
    link.split_once("?token=").map(|(_, token)| token.to_string())
}

pub struct Harness {
    pub auth: Arc<AuthOrchestrator<MemoryTokenStore, MemoryIdentityStore>>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: ManualClock,
}

pub fn harness() -> Harness {
    harness_with_config(AuthConfig::default().with_base_url("https://app.test"))
}

/// Log to the test writer; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness_with_config(config: AuthConfig) -> Harness {
    init_tracing();
    let clock = ManualClock::default();
    let mailer = Arc::new(RecordingMailer::default());

    let auth = AuthOrchestratorBuilder::new()
        .config(config)
        .clock(Arc::new(clock.clone()))
        .signing_key(SigningKey::hs256(TEST_HS256_SECRET).unwrap())
        .mailer(mailer.clone())
        .with_memory_stores()
        .build()
        .unwrap();

    Harness {
        auth: Arc::new(auth),
        mailer,
        clock,
    }
}

pub fn new_identity(email: &str, username: &str) -> NewIdentity {
    NewIdentity::builder()
        .email(email)
        .username(username)
        .first_name("Test")
        .build()
        .unwrap()
}

impl Harness {
    pub async fn register(&self, email: &str, username: &str) -> Identity {
        self.auth
            .register(new_identity(email, username))
            .await
            .unwrap()
    }

    /// Request a login and return the token from the delivered link.
    pub async fn login_token(&self, email: &str) -> String {
        self.auth.request_login(email).await.unwrap();
        self.mailer.last_token_for(email).unwrap()
    }
}

/// Token store whose writes fail a fixed number of times before succeeding.
pub struct FlakyTokenStore {
    inner: MemoryTokenStore,
    failures_left: Mutex<u32>,
    pub put_calls: Mutex<u32>,
}

impl FlakyTokenStore {
    pub fn new(inner: MemoryTokenStore, failures: u32) -> Self {
        Self {
            inner,
            failures_left: Mutex::new(failures),
            put_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TokenStore for FlakyTokenStore {
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, Error> {
        *self.put_calls.lock().unwrap() += 1;
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageError::Unavailable("connection reset".to_string()).into());
            }
        }
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, Error> {
        self.inner.get_and_delete(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.inner.get(key).await
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        self.inner.purge_expired().await
    }
}

/// Seed `store` directly, bypassing registration checks.
pub async fn seed_identity<I: IdentityStore>(store: &I, email: &str, username: &str) -> Identity {
    store.create(new_identity(email, username)).await.unwrap()
}
