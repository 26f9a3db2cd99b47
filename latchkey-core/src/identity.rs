//! Identity records
//!
//! An identity is the durable record a magic link authenticates. It is owned by
//! an external [`IdentityStore`](crate::storage::IdentityStore); latchkey only
//! reads it, caches it and passes new records through.
//!
//! | Field        | Type       | Description                                     |
//! | ------------ | ---------- | ----------------------------------------------- |
//! | `id`         | `String`   | Stable, opaque identifier (`idn_…`).            |
//! | `email`      | `String`   | Login address; the session token subject.       |
//! | `username`   | `String`   | Unique public handle.                           |
//! | `first_name` | `String`   | Given name.                                     |
//! | `last_name`  | `String`   | Family name.                                    |
//! | `role`       | `Role`     | Authorization role carried in session claims.   |
//! | `created_at` | `DateTime` | When the record was created.                    |
//! | `updated_at` | `DateTime` | When the record was last written.               |
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::{ValidationError, utilities::RequiredFieldExt},
    id::{generate_prefixed_id, validate_prefixed_id},
};

/// A unique, stable identifier for an identity. Treat as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: &str) -> Self {
        IdentityId(id.to_string())
    }

    pub fn new_random() -> Self {
        IdentityId(generate_prefixed_id("idn"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "idn")
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authorization role, carried as the `role` claim of session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidField(format!("Unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An identity that has not been written to the store yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
    pub id: IdentityId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl NewIdentity {
    pub fn builder() -> NewIdentityBuilder {
        NewIdentityBuilder::default()
    }

    /// Materialize the record as a store would on insert.
    pub fn into_identity(self, now: DateTime<Utc>) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Default)]
pub struct NewIdentityBuilder {
    id: Option<IdentityId>,
    email: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<Role>,
}

impl NewIdentityBuilder {
    pub fn id(mut self, id: IdentityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn build(self) -> Result<NewIdentity, Error> {
        Ok(NewIdentity {
            id: self.id.unwrap_or_default(),
            email: self.email.require_field("Email")?,
            username: self.username.require_field("Username")?,
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
        })
    }
}
