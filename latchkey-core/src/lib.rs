//! Core credential primitives for latchkey
//!
//! This crate contains the pieces the [`latchkey`] facade composes into a
//! passwordless login flow:
//!
//! - [`MagicLinkIssuer`] and [`MagicLinkVerifier`]: single-use tokens kept in a
//!   [`TokenStore`], consumed with an atomic get-and-delete.
//! - [`SessionTokenService`]: signed, self-contained session tokens.
//! - [`IdentityCache`]: a cache-aside layer over an external [`IdentityStore`].
//!
//! Storage backends implement the traits in [`storage`]; in-memory versions are
//! provided for tests and single-node use, and a SQLite backend lives in
//! `latchkey-storage-sqlite`.
//!
//! [`latchkey`]: https://docs.rs/latchkey
pub mod cache;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod id;
pub mod identity;
pub mod magic_link;
pub mod mailer;
pub mod session;
pub mod storage;
pub mod validation;

pub use cache::{CacheKey, IdentityCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use identity::{Identity, IdentityId, NewIdentity, NewIdentityBuilder, Role};
pub use magic_link::{MagicLinkIssuer, MagicLinkVerifier, MagicToken};
pub use mailer::{MagicLinkMailer, TracingMailer};
pub use session::{SessionClaims, SessionToken, SessionTokenService, SigningKey};
pub use storage::{IdentityStore, MemoryIdentityStore, MemoryTokenStore, TokenStore};
