//! # Latchkey
//!
//! Passwordless authentication: single-use magic links exchanged for signed
//! session tokens.
//!
//! A login goes through two calls:
//!
//! 1. [`AuthOrchestrator::request_login`] issues a magic link for a known
//!    identity and hands it to a [`MagicLinkMailer`].
//! 2. [`AuthOrchestrator::complete_login`] consumes the token from the link
//!    (at most once, even under concurrent requests) and mints a session token.
//!
//! Subsequent requests present the session token as a bearer credential and are
//! resolved with [`AuthOrchestrator::authenticate`].
//!
//! ## Storage Support
//!
//! - In memory ([`MemoryTokenStore`], [`MemoryIdentityStore`])
//! - SQLite (`sqlite` feature, enabled by default)
//!
//! Any shared key/value store with a TTL and an atomic get-and-delete can back
//! [`TokenStore`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use latchkey::{AuthOrchestratorBuilder, NewIdentity, SigningKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), latchkey::Error> {
//!     let auth = AuthOrchestratorBuilder::new()
//!         .signing_key(SigningKey::hs256(b"an example secret of at least 32 bytes")?)
//!         .with_memory_stores()
//!         .build()?;
//!
//!     auth.register(
//!         NewIdentity::builder()
//!             .email("user@example.com")
//!             .username("user")
//!             .build()?,
//!     )
//!     .await?;
//!
//!     // The link is delivered by the mailer; the token comes back on the verify route.
//!     auth.request_login("user@example.com").await?;
//!     Ok(())
//! }
//! ```
mod builder;
mod config;
mod orchestrator;
mod state;

pub use builder::{AuthOrchestratorBuilder, NoStorage, WithStorage};
pub use config::{
    AuthConfig, DEFAULT_BASE_URL, DEFAULT_CLEANUP_INTERVAL, DEFAULT_ISSUE_ATTEMPTS,
    MAX_DURATION_SECS, MIN_CLEANUP_INTERVAL,
};
pub use orchestrator::{
    AuthOrchestrator, AuthSession, AuthenticatedIdentity, IDENTITY_ID_CLAIM, LinkIssued,
};
pub use state::LoginState;

/// Re-export core types from latchkey_core
pub use latchkey_core::{
    CacheKey, Clock, Error, Identity, IdentityCache, IdentityId, IdentityStore, MagicLinkMailer,
    ManualClock, MemoryIdentityStore, MemoryTokenStore, NewIdentity, Role, SessionClaims,
    SessionToken, SessionTokenService, SigningKey, SystemClock, TokenStore, TracingMailer,
    error, session::bearer_token,
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub use latchkey_storage_sqlite::{SqliteBackend, SqliteIdentityStore, SqliteTokenStore};
