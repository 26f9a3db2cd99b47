use std::sync::Arc;

use chrono::{DateTime, Utc};
use latchkey_core::{
    Clock, Error, Identity, IdentityCache, IdentityId, IdentityStore, MagicLinkIssuer,
    MagicLinkMailer, MagicLinkVerifier, MagicToken, NewIdentity, SessionClaims, SessionToken,
    SessionTokenService, SigningKey, TokenStore,
    error::{AuthError, SessionError},
    session::{ExtraClaims, bearer_token},
    storage::with_timeout,
    validation::{validate_email, validate_username},
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{AuthConfig, LoginState, config::MIN_CLEANUP_INTERVAL};

/// Extra claim carrying the identity id, used to find the record again when
/// its email has changed since the session was minted.
pub const IDENTITY_ID_CLAIM: &str = "uid";

/// A magic link has been issued and handed to the mailer.
///
/// The token itself is only ever delivered through the link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkIssued {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// The result of a completed login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// The identity behind a presented session token.
///
/// Handlers receive this value explicitly; there is no ambient context.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub identity: Identity,
    pub claims: SessionClaims,
}

/// Drives the passwordless login flow.
///
/// `request_login` issues a single-use link for a known identity and hands it
/// to the mailer. `complete_login` consumes the link and mints a session token.
/// Session tokens are then checked with `authenticate` and renewed with
/// `refresh`.
pub struct AuthOrchestrator<S: TokenStore, I: IdentityStore> {
    config: AuthConfig,
    tokens: Arc<S>,
    identities: IdentityCache<I>,
    issuer: MagicLinkIssuer<S>,
    verifier: MagicLinkVerifier<S>,
    sessions: SessionTokenService,
    mailer: Arc<dyn MagicLinkMailer>,
    clock: Arc<dyn Clock>,
}

impl<S: TokenStore, I: IdentityStore> AuthOrchestrator<S, I> {
    pub fn new(
        config: AuthConfig,
        tokens: Arc<S>,
        identities: Arc<I>,
        signing_key: SigningKey,
        mailer: Arc<dyn MagicLinkMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = MagicLinkIssuer::new(Arc::clone(&tokens), Arc::clone(&clock))
            .with_ttl(config.magic_link_ttl)
            .with_retention(config.expired_token_retention)
            .with_store_timeout(config.store_timeout);

        let verifier = MagicLinkVerifier::new(Arc::clone(&tokens), Arc::clone(&clock))
            .with_store_timeout(config.store_timeout);

        let mut sessions =
            SessionTokenService::new(signing_key, Arc::clone(&clock)).with_ttl(config.session_ttl);
        if let Some(issuer) = &config.issuer {
            sessions = sessions.with_issuer(issuer.clone());
        }

        let identities = IdentityCache::new(identities, Arc::clone(&clock))
            .with_ttl(config.identity_cache_ttl)
            .with_store_timeout(config.store_timeout);

        Self {
            config,
            tokens,
            identities,
            issuer,
            verifier,
            sessions,
            mailer,
            clock,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTokenService {
        &self.sessions
    }

    pub fn identities(&self) -> &IdentityCache<I> {
        &self.identities
    }

    pub fn token_store(&self) -> &Arc<S> {
        &self.tokens
    }

    /// Issue a magic link for a known identity and dispatch it.
    ///
    /// Issuance is retried while the token store is unavailable. Dispatch is
    /// best effort: a mailer failure is logged and the link stays valid.
    pub async fn request_login(&self, email: &str) -> Result<LinkIssued, Error> {
        tracing::debug!(email = %email, state = %LoginState::Requested, "Login requested");

        let identity = self.identities.find_by_email(email).await?.ok_or_else(|| {
            tracing::warn!(email = %email, "Login requested for unknown identity");
            Error::from(AuthError::IdentityNotFound)
        })?;

        let token = self.issue_with_retry(&identity.email).await?;
        let link = token.link(&self.config.base_url);

        let greeting = if identity.first_name.is_empty() {
            identity.username.as_str()
        } else {
            identity.first_name.as_str()
        };
        if let Err(e) = self
            .mailer
            .send_magic_link(&identity.email, &link, Some(greeting))
            .await
        {
            tracing::warn!(
                email = %identity.email,
                error = %e,
                "Failed to dispatch magic link"
            );
        }

        tracing::info!(
            email = %identity.email,
            expires_at = %token.expires_at,
            state = %LoginState::LinkIssued,
            "Magic link issued"
        );

        Ok(LinkIssued {
            email: token.email,
            expires_at: token.expires_at,
        })
    }

    async fn issue_with_retry(&self, email: &str) -> Result<MagicToken, Error> {
        let mut attempt = 1;
        loop {
            match self.issuer.issue(email).await {
                Err(e) if e.is_retryable() && attempt < self.config.issue_attempts => {
                    tracing::warn!(attempt, error = %e, "Magic link issuance failed, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Consume a magic link token and mint a session for its identity.
    ///
    /// Never retried: if the store consumed the token but the reply was lost,
    /// the caller must request a new link.
    pub async fn complete_login(&self, token: &str) -> Result<AuthSession, Error> {
        let email = self.verifier.verify(token).await.inspect_err(|e| {
            if let Some(state) = LoginState::from_error(e) {
                tracing::warn!(state = %state, error = %e, "Login attempt ended");
            }
        })?;
        tracing::debug!(email = %email, state = %LoginState::Verified, "Magic link verified");

        let identity = self.identities.find_by_email(&email).await?.ok_or_else(|| {
            tracing::warn!(email = %email, "Identity removed before login completed");
            Error::from(AuthError::IdentityNotFound)
        })?;

        let (token, claims) = self.mint_for(&identity)?;

        tracing::info!(
            identity_id = %identity.id,
            state = %LoginState::SessionIssued,
            "Session issued"
        );

        Ok(AuthSession {
            identity,
            token,
            expires_at: claims.expires_at(),
        })
    }

    fn mint_for(&self, identity: &Identity) -> Result<(SessionToken, SessionClaims), Error> {
        let mut extra = ExtraClaims::new();
        extra.insert(
            IDENTITY_ID_CLAIM.to_string(),
            serde_json::Value::String(identity.id.to_string()),
        );
        self.sessions
            .mint_session(&identity.email, identity.role, extra)
    }

    /// Mint a replacement for a session whose claims were already validated.
    ///
    /// The magic link store is not touched. Claims that have expired since
    /// they were parsed are rejected.
    pub fn refresh(&self, claims: &SessionClaims) -> Result<SessionToken, Error> {
        if claims.is_expired_at(self.clock.now()) {
            return Err(SessionError::SessionExpired.into());
        }
        let token = self.sessions.reissue(claims)?;
        tracing::debug!(subject = %claims.sub, "Session refreshed");
        Ok(token)
    }

    pub fn refresh_token(&self, token: &str) -> Result<SessionToken, Error> {
        let claims = self.sessions.parse(token)?;
        self.refresh(&claims)
    }

    /// Resolve a session token to the identity it was issued for.
    ///
    /// Fails with `SubjectMismatch` when the identity's email changed after the
    /// token was minted.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedIdentity, Error> {
        let claims = self.sessions.parse(token)?;

        let identity = match claims
            .extra
            .get(IDENTITY_ID_CLAIM)
            .and_then(|value| value.as_str())
        {
            Some(id) => self.identities.find_by_id(&IdentityId::new(id)).await?,
            None => self.identities.find_by_email(&claims.sub).await?,
        }
        .ok_or(AuthError::IdentityNotFound)?;

        if !self.sessions.is_valid_for(token, &identity.email) {
            tracing::warn!(
                identity_id = %identity.id,
                "Session subject no longer matches identity"
            );
            return Err(SessionError::SubjectMismatch.into());
        }

        Ok(AuthenticatedIdentity { identity, claims })
    }

    /// [`authenticate`](Self::authenticate) from an `Authorization` header value.
    pub async fn authenticate_header(
        &self,
        authorization: &str,
    ) -> Result<AuthenticatedIdentity, Error> {
        let token = bearer_token(authorization).ok_or_else(|| {
            SessionError::TokenMalformed("Expected a bearer token".to_string())
        })?;
        self.authenticate(token).await
    }

    /// Create an identity. No credential is issued; the identity logs in
    /// through `request_login` like any other.
    pub async fn register(&self, identity: NewIdentity) -> Result<Identity, Error> {
        validate_email(&identity.email)?;
        validate_username(&identity.username)?;

        if self.identities.find_by_email(&identity.email).await?.is_some() {
            tracing::warn!(email = %identity.email, "Registration for existing email");
            return Err(AuthError::IdentityAlreadyExists.into());
        }
        if self
            .identities
            .find_by_username(&identity.username)
            .await?
            .is_some()
        {
            tracing::warn!(username = %identity.username, "Registration for taken username");
            return Err(AuthError::UsernameTaken.into());
        }

        let created = self.identities.create(identity).await?;
        tracing::info!(identity_id = %created.id, "Identity registered");
        Ok(created)
    }

    pub async fn update_identity(&self, identity: &Identity) -> Result<Identity, Error> {
        validate_email(&identity.email)?;
        validate_username(&identity.username)?;
        self.identities.update(identity).await
    }

    pub async fn delete_identity(&self, id: &IdentityId) -> Result<(), Error> {
        self.identities.delete(id).await
    }

    /// Remove magic link entries past their retention window.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, Error> {
        with_timeout(self.config.store_timeout, self.tokens.purge_expired()).await
    }

    /// Run [`cleanup_expired_tokens`](Self::cleanup_expired_tokens) every
    /// `cleanup_interval` until `shutdown` changes.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let period = self.config.cleanup_interval.max(MIN_CLEANUP_INTERVAL);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match orchestrator.cleanup_expired_tokens().await {
                            Ok(count) if count > 0 => {
                                tracing::info!(count, "Purged expired magic links");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to purge expired magic links");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down magic link cleanup task");
                        break;
                    }
                }
            }
        })
    }
}
