use std::fmt;

use latchkey_core::{
    Error,
    error::{MagicLinkError, StorageError, ValidationError},
};

/// Where a login attempt stands.
///
/// ```text
/// Requested -> LinkIssued -> Verified -> SessionIssued
///                         \-> Expired | Consumed | Invalid
/// ```
///
/// Attempts are not tracked server side; the state is derived from the outcome
/// of each call and recorded on its log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    Requested,
    LinkIssued,
    Verified,
    SessionIssued,
    Expired,
    Consumed,
    Invalid,
}

impl LoginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginState::Requested => "requested",
            LoginState::LinkIssued => "link_issued",
            LoginState::Verified => "verified",
            LoginState::SessionIssued => "session_issued",
            LoginState::Expired => "expired",
            LoginState::Consumed => "consumed",
            LoginState::Invalid => "invalid",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoginState::SessionIssued
                | LoginState::Expired
                | LoginState::Consumed
                | LoginState::Invalid
        )
    }

    /// Terminal state for a failed verification, if the failure ends the
    /// attempt. Infrastructure failures do not: the link may still be usable.
    pub fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::MagicLink(MagicLinkError::TokenExpired) => Some(LoginState::Expired),
            Error::MagicLink(MagicLinkError::TokenInvalidOrConsumed) => {
                Some(LoginState::Consumed)
            }
            Error::Validation(ValidationError::InvalidField(_))
            | Error::Validation(ValidationError::MissingField(_))
            | Error::Storage(StorageError::Serialization(_)) => {
                Some(LoginState::Invalid)
            }
            _ => None,
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
