pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Magic link error: {0}")]
    MagicLink(#[from] MagicLinkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Identity already exists")]
    IdentityAlreadyExists,

    #[error("Username already taken")]
    UsernameTaken,
}

/// Failures of the one-time magic link flow.
///
/// `TokenInvalidOrConsumed` deliberately covers "never existed", "already used"
/// and "lost a concurrent race" so callers cannot tell them apart.
#[derive(Debug, Error)]
pub enum MagicLinkError {
    #[error("Failed to generate a unique magic link token")]
    TokenGenerationFailed,

    #[error("Magic link token is invalid or has already been used")]
    TokenInvalidOrConsumed,

    #[error("Magic link token expired")]
    TokenExpired,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session token signature")]
    SignatureInvalid,

    #[error("Malformed session token: {0}")]
    TokenMalformed(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session subject does not match identity")]
    SubjectMismatch,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("JWT signing failed: {0}")]
    JwtSigning(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

impl Error {
    /// Whether the operation may be attempted again with the same input.
    ///
    /// Only issuance paths act on this. Verification is never retried because
    /// an unknown outcome may already have consumed the token.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::Unavailable(_))
                | Error::MagicLink(MagicLinkError::TokenGenerationFailed)
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Auth(_)
                | Error::Validation(_)
                | Error::MagicLink(MagicLinkError::TokenInvalidOrConsumed)
                | Error::MagicLink(MagicLinkError::TokenExpired)
        ) || self.requires_reauthentication()
    }

    /// Any session failure means the caller has to log in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
