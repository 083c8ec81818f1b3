//! # Token Service
//!
//! Couples the stateless JWT layer to the stateful ledger: every issued
//! pair records a session, and every validation consults the blacklist.
//!
//! ## Issuance
//!
//! ```text
//! issue_pair(user, roles, app?, device)
//!   ├── JwtService: mint access (jti A) + refresh (jti R)
//!   ├── TokenHasher: HMAC(refresh envelope) ──► session.token_hash
//!   └── SessionRepository: insert row { access_token_jti: A }
//! ```
//!
//! ## Validation
//!
//! Signature and claim checks are delegated to the JWT service; this layer
//! adds the blacklist check (cache fast path, database authority — **fail
//! closed** when the cache is down) and the tenant-binding check.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use shared::auth::jwt::{Claims, JwtService, TokenPair, TokenSubject};
use shared::crypto::TokenHasher;
use shared::errors::ApiError;
use shared::redis_client::RedisClient;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{DeviceInfo, NewSession, Session, User};
use crate::repository::{BlacklistRepository, SessionRepository};

/// Issues token pairs backed by session rows and validates access tokens
/// against signature, blacklist, and tenant binding.
#[derive(Clone)]
pub struct TokenService {
    jwt: Arc<JwtService>,
    hasher: TokenHasher,
    sessions: SessionRepository,
    blacklist: BlacklistRepository,
    redis: RedisClient,
}

impl TokenService {
    /// Creates the service over its collaborators.
    pub fn new(
        jwt: Arc<JwtService>,
        hasher: TokenHasher,
        sessions: SessionRepository,
        blacklist: BlacklistRepository,
        redis: RedisClient,
    ) -> Self {
        Self {
            jwt,
            hasher,
            sessions,
            blacklist,
            redis,
        }
    }

    /// The underlying JWT service, for JWKS and discovery documents.
    pub fn jwt(&self) -> &Arc<JwtService> {
        &self.jwt
    }

    /// The credential hasher shared across services.
    pub fn hasher(&self) -> &TokenHasher {
        &self.hasher
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// Mints an access + refresh pair and records the backing session.
    pub async fn issue_pair(
        &self,
        user: &User,
        roles: Vec<String>,
        application_id: Option<Uuid>,
        device: &DeviceInfo,
    ) -> Result<(TokenPair, Session), ApiError> {
        let subject = TokenSubject {
            user_id: user.user_id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles,
            is_active: user.is_active,
            application_id,
        };

        let tokens = self.jwt.generate_tokens(&subject)?;

        // The session is keyed by the pepper-HMAC of the refresh envelope;
        // the access token's jti rides along for cascade blacklisting
        let access_claims = self.jwt.validate_access_token(&tokens.access_token)?;
        let token_hash = self.hasher.hash(&tokens.refresh_token);
        let expires_at =
            Utc::now() + ChronoDuration::seconds(self.jwt.refresh_token_ttl_seconds() as i64);

        let session = self
            .sessions
            .create(NewSession {
                user_id: user.user_id,
                token_hash,
                access_token_jti: access_claims.jti,
                application_id,
                device_type: device.device_type.clone(),
                device_os: device.os.clone(),
                device_browser: device.browser.clone(),
                ip_address: device.ip_address.clone(),
                user_agent: device.user_agent.clone(),
                session_name: device.session_name(),
                expires_at,
            })
            .await?;

        Ok((tokens, session))
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Fully validates an access token: signature, expiry, blacklist,
    /// tenant binding.
    pub async fn validate_access(
        &self,
        token: &str,
        context_application_id: Option<Uuid>,
    ) -> Result<Claims, ApiError> {
        let claims = self.jwt.validate_access_token(token)?;

        // Tenant binding is checked before the blacklist lookup: a
        // mismatched token is rejected without touching shared state
        JwtService::ensure_application(&claims, context_application_id)?;

        if self.is_jti_blacklisted(claims.jti).await? {
            return Err(ApiError::InvalidToken);
        }

        Ok(claims)
    }

    /// Blacklist membership for a token id.
    ///
    /// Cache first; on cache failure the authoritative database decides
    /// (fail closed — a down cache must not resurrect revoked tokens).
    pub async fn is_jti_blacklisted(&self, jti: Uuid) -> Result<bool, ApiError> {
        let jti_str = jti.to_string();

        match self.redis.is_token_blacklisted(&jti_str).await {
            Ok(true) => Ok(true),
            Ok(false) => Ok(false),
            Err(e) => {
                warn!(error = %e, "blacklist cache unavailable, consulting database");
                self.blacklist.is_blacklisted(&jti_str).await
            }
        }
    }

    /// Blacklists an access token id until its natural expiry.
    ///
    /// Writes the authoritative row first, then the cache fast path
    /// (best-effort: a cache miss later falls back to the row).
    pub async fn blacklist_jti(
        &self,
        jti: Uuid,
        user_id: Option<Uuid>,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let jti_str = jti.to_string();

        self.blacklist.insert(&jti_str, user_id, expires_at).await?;

        let remaining = (expires_at - Utc::now()).num_seconds().max(1) as u64;
        if let Err(e) = self
            .redis
            .blacklist_token(&jti_str, std::time::Duration::from_secs(remaining))
            .await
        {
            warn!(error = %e, "failed to cache blacklist entry");
        }

        Ok(())
    }

    /// Blacklists the access tokens paired with the given sessions.
    ///
    /// Used by sign-out and reuse-detection cascades; the TTL is the
    /// access-token lifetime measured from each session's creation.
    pub async fn blacklist_sessions_access_tokens(
        &self,
        sessions: &[Session],
    ) -> Result<(), ApiError> {
        let ttl = ChronoDuration::seconds(self.jwt.access_token_ttl_seconds() as i64);

        for session in sessions {
            let expires_at = session.created_at + ttl;
            if expires_at <= Utc::now() {
                // The paired access token already lapsed naturally
                continue;
            }
            self.blacklist_jti(session.access_token_jti, Some(session.user_id), expires_at)
                .await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}
