//! # Session Service
//!
//! Ledger queries and selective revocation for the "manage my devices"
//! surface. Bulk revocation on security events lives in
//! [`crate::service::AuthService`]; this service covers the read side and
//! single-session operations.

use chrono::Utc;
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::events::{EventEmitter, SessionRevoked};
use crate::domain::{Session, SessionStats};
use crate::repository::SessionRepository;
use crate::service::TokenService;

/// Session ledger operations.
#[derive(Clone)]
pub struct SessionService {
    repository: SessionRepository,
    tokens: TokenService,
    events: EventEmitter,
}

impl SessionService {
    /// Creates the service over its collaborators.
    pub fn new(repository: SessionRepository, tokens: TokenService) -> Self {
        Self {
            repository,
            tokens,
            events: EventEmitter,
        }
    }

    /// Lists a user's active sessions, most recently active first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Session>, ApiError> {
        self.repository.list_active_for_user(user_id).await
    }

    /// Active-session statistics grouped by device class, OS, and browser.
    pub async fn stats(&self, user_id: Uuid) -> Result<SessionStats, ApiError> {
        self.repository.stats_for_user(user_id).await
    }

    /// Revokes one session and blacklists its paired access token.
    ///
    /// Owner-scoped: a user can only revoke their own sessions. Revoking
    /// an already-revoked session is idempotent.
    pub async fn revoke(&self, session_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let Some(session) = self.repository.revoke_by_id(session_id, user_id).await? else {
            // Already revoked or not owned; monotone either way
            return Ok(());
        };

        self.tokens
            .blacklist_sessions_access_tokens(std::slice::from_ref(&session))
            .await?;

        self.events.emit(&SessionRevoked {
            user_id,
            count: 1,
            reason: "sign_out".to_string(),
            occurred_at: Utc::now(),
        });

        Ok(())
    }

    /// Bumps a session's activity timestamp.
    pub async fn touch(&self, session_id: Uuid) -> Result<(), ApiError> {
        self.repository.touch_activity(session_id).await
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}
