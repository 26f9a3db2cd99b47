use chrono::Duration;
use latchkey_core::{
    Error,
    cache::DEFAULT_IDENTITY_CACHE_TTL,
    error::ValidationError,
    magic_link::{DEFAULT_EXPIRED_TOKEN_RETENTION, DEFAULT_MAGIC_LINK_TTL, DEFAULT_STORE_TIMEOUT},
    session::DEFAULT_SESSION_TTL,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_ISSUE_ATTEMPTS: u32 = 3;
pub const DEFAULT_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);
/// Shortest period the cleanup task runs at; zero is raised to this.
pub const MIN_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);
/// Largest duration accepted from the environment, in seconds (about 100 years).
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Settings for an [`AuthOrchestrator`](crate::AuthOrchestrator).
///
/// Signing key material is configured separately through
/// [`SigningKey`](crate::SigningKey).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// How long a magic link stays valid.
    pub magic_link_ttl: Duration,
    /// How long a session token stays valid.
    pub session_ttl: Duration,
    /// Prefix of the magic link, e.g. `https://app.example.com`.
    pub base_url: String,
    /// How long an expired magic link is kept so it can be reported as expired
    /// rather than unknown.
    pub expired_token_retention: Duration,
    pub identity_cache_ttl: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: std::time::Duration,
    /// Attempts made to issue a link when the store is unavailable.
    pub issue_attempts: u32,
    pub cleanup_interval: std::time::Duration,
    /// `iss` claim for session tokens.
    pub issuer: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            magic_link_ttl: DEFAULT_MAGIC_LINK_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            base_url: DEFAULT_BASE_URL.to_string(),
            expired_token_retention: DEFAULT_EXPIRED_TOKEN_RETENTION,
            identity_cache_ttl: DEFAULT_IDENTITY_CACHE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            issue_attempts: DEFAULT_ISSUE_ATTEMPTS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            issuer: None,
        }
    }
}

impl AuthConfig {
    pub fn with_magic_link_ttl(mut self, ttl: Duration) -> Self {
        self.magic_link_ttl = ttl;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_expired_token_retention(mut self, retention: Duration) -> Self {
        self.expired_token_retention = retention;
        self
    }

    pub fn with_identity_cache_ttl(mut self, ttl: Duration) -> Self {
        self.identity_cache_ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_issue_attempts(mut self, attempts: u32) -> Self {
        self.issue_attempts = attempts.max(1);
        self
    }

    /// Zero is raised to [`MIN_CLEANUP_INTERVAL`].
    pub fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.cleanup_interval = interval.max(MIN_CLEANUP_INTERVAL);
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Defaults overridden by any `LATCHKEY_*` variables that are set.
    ///
    /// Second-valued variables above [`MAX_DURATION_SECS`] are rejected.
    ///
    /// | Variable | Unit |
    /// | --- | --- |
    /// | `LATCHKEY_MAGIC_LINK_TTL_SECS` | seconds |
    /// | `LATCHKEY_SESSION_TTL_SECS` | seconds |
    /// | `LATCHKEY_BASE_URL` | |
    /// | `LATCHKEY_EXPIRED_TOKEN_RETENTION_SECS` | seconds |
    /// | `LATCHKEY_IDENTITY_CACHE_TTL_SECS` | seconds |
    /// | `LATCHKEY_STORE_TIMEOUT_MS` | milliseconds |
    /// | `LATCHKEY_ISSUE_ATTEMPTS` | count |
    /// | `LATCHKEY_CLEANUP_INTERVAL_SECS` | seconds |
    /// | `LATCHKEY_ISSUER` | |
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Result<Option<u64>, Error> {
            lookup(name)
                .map(|value| {
                    value.trim().parse::<u64>().map_err(|_| {
                        Error::from(ValidationError::InvalidField(format!(
                            "{name} must be a non-negative integer, got {value:?}"
                        )))
                    })
                })
                .transpose()
        };
        let seconds = |name: &str| -> Result<Option<Duration>, Error> {
            number(name)?
                .map(|secs| {
                    i64::try_from(secs)
                        .ok()
                        .filter(|_| secs <= MAX_DURATION_SECS)
                        .and_then(Duration::try_seconds)
                        .ok_or_else(|| {
                            Error::from(ValidationError::InvalidField(format!(
                                "{name} is out of range, got {secs}"
                            )))
                        })
                })
                .transpose()
        };

        let mut config = Self::default();
        if let Some(ttl) = seconds("LATCHKEY_MAGIC_LINK_TTL_SECS")? {
            config.magic_link_ttl = ttl;
        }
        if let Some(ttl) = seconds("LATCHKEY_SESSION_TTL_SECS")? {
            config.session_ttl = ttl;
        }
        if let Some(base_url) = lookup("LATCHKEY_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(retention) = seconds("LATCHKEY_EXPIRED_TOKEN_RETENTION_SECS")? {
            config.expired_token_retention = retention;
        }
        if let Some(ttl) = seconds("LATCHKEY_IDENTITY_CACHE_TTL_SECS")? {
            config.identity_cache_ttl = ttl;
        }
        if let Some(millis) = number("LATCHKEY_STORE_TIMEOUT_MS")? {
            config.store_timeout = std::time::Duration::from_millis(millis);
        }
        if let Some(attempts) = number("LATCHKEY_ISSUE_ATTEMPTS")? {
            config.issue_attempts = u32::try_from(attempts).unwrap_or(u32::MAX).max(1);
        }
        if let Some(interval) = seconds("LATCHKEY_CLEANUP_INTERVAL_SECS")? {
            config = config.with_cleanup_interval(interval.to_std().unwrap_or(MIN_CLEANUP_INTERVAL));
        }
        if let Some(issuer) = lookup("LATCHKEY_ISSUER") {
            config.issuer = Some(issuer);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.magic_link_ttl, Duration::minutes(15));
        assert_eq!(config.session_ttl, Duration::hours(24));
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.store_timeout, std::time::Duration::from_millis(500));
        assert_eq!(config.issue_attempts, 3);
        assert!(config.issuer.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("LATCHKEY_MAGIC_LINK_TTL_SECS", "600"),
            ("LATCHKEY_BASE_URL", "https://app.test"),
            ("LATCHKEY_STORE_TIMEOUT_MS", "250"),
            ("LATCHKEY_ISSUER", "latchkey"),
        ]))
        .unwrap();

        assert_eq!(config.magic_link_ttl, Duration::minutes(10));
        assert_eq!(config.base_url, "https://app.test");
        assert_eq!(config.store_timeout, std::time::Duration::from_millis(250));
        assert_eq!(config.issuer.as_deref(), Some("latchkey"));
        assert_eq!(config.session_ttl, DEFAULT_SESSION_TTL);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = AuthConfig::from_lookup(lookup(&[("LATCHKEY_SESSION_TTL_SECS", "soon")]));
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidField(_)))
        ));
    }

    #[test]
    fn test_issue_attempts_never_zero() {
        let config = AuthConfig::from_lookup(lookup(&[("LATCHKEY_ISSUE_ATTEMPTS", "0")])).unwrap();
        assert_eq!(config.issue_attempts, 1);
        assert_eq!(AuthConfig::default().with_issue_attempts(0).issue_attempts, 1);
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_seconds() {
        for value in ["99999999999999999", "18446744073709551615"] {
            let result =
                AuthConfig::from_lookup(lookup(&[("LATCHKEY_SESSION_TTL_SECS", value)]));
            assert!(
                matches!(
                    result,
                    Err(Error::Validation(ValidationError::InvalidField(_)))
                ),
                "{value} should be rejected"
            );
        }

        let config = AuthConfig::from_lookup(lookup(&[(
            "LATCHKEY_MAGIC_LINK_TTL_SECS",
            &MAX_DURATION_SECS.to_string(),
        )]))
        .unwrap();
        assert_eq!(config.magic_link_ttl.num_seconds() as u64, MAX_DURATION_SECS);
    }

    #[test]
    fn test_cleanup_interval_never_zero() {
        let config =
            AuthConfig::from_lookup(lookup(&[("LATCHKEY_CLEANUP_INTERVAL_SECS", "0")])).unwrap();
        assert_eq!(config.cleanup_interval, MIN_CLEANUP_INTERVAL);
        assert_eq!(
            AuthConfig::default()
                .with_cleanup_interval(std::time::Duration::ZERO)
                .cleanup_interval,
            MIN_CLEANUP_INTERVAL
        );

        let config =
            AuthConfig::from_lookup(lookup(&[("LATCHKEY_CLEANUP_INTERVAL_SECS", "90")])).unwrap();
        assert_eq!(config.cleanup_interval, std::time::Duration::from_secs(90));
    }
}
