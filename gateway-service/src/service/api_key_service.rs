//! # API Key Service
//!
//! Issues, validates, and revokes user-bound `agw_` credentials.
//!
//! ## Issuance Contract
//!
//! The plaintext key exists exactly once: in the issuance response. The
//! row keeps its HMAC digest plus the first 12 characters so operators
//! can tell keys apart in listings.
//!
//! ## Validation Path
//!
//! Validation is on the hot path of every API-key-authenticated RPC, so
//! the `last_used_at` bump runs in a detached task — it must never extend
//! caller latency, and its failure is logged and swallowed (fail open).

use chrono::{DateTime, Utc};
use shared::crypto::{self, TokenHasher};
use shared::errors::ApiError;
use tracing::warn;
use uuid::Uuid;

use crate::domain::events::{ApiKeyCreated, ApiKeyRevoked, EventEmitter};
use crate::domain::{ApiKey, NewApiKey};
use crate::repository::ApiKeyRepository;

/// Result of issuing a key: the row plus the one-time plaintext.
#[derive(Debug)]
pub struct IssuedApiKey {
    /// The stored row
    pub api_key: ApiKey,
    /// Plaintext, returned to the caller exactly once
    pub plaintext: String,
}

/// API key lifecycle operations.
#[derive(Clone)]
pub struct ApiKeyService {
    repository: ApiKeyRepository,
    hasher: TokenHasher,
    events: EventEmitter,
}

impl ApiKeyService {
    /// Creates the service over its collaborators.
    pub fn new(repository: ApiKeyRepository, hasher: TokenHasher) -> Self {
        Self {
            repository,
            hasher,
            events: EventEmitter,
        }
    }

    /// Issues a new key for a user.
    pub async fn issue(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
        name: &str,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedApiKey, ApiError> {
        let plaintext = crypto::generate_api_key();

        let api_key = self
            .repository
            .create(NewApiKey {
                user_id,
                application_id,
                name: name.to_string(),
                key_hash: self.hasher.hash(&plaintext),
                key_prefix: crypto::key_prefix(&plaintext),
                scopes,
                expires_at,
            })
            .await?;

        self.events.emit(&ApiKeyCreated {
            api_key_id: api_key.api_key_id,
            user_id,
            key_prefix: api_key.key_prefix.clone(),
            occurred_at: Utc::now(),
        });

        Ok(IssuedApiKey { api_key, plaintext })
    }

    /// Validates a presented plaintext key.
    ///
    /// Revoked, expired, and unknown keys all fail with the same
    /// `invalid_credentials`. On success the `last_used_at` bump detaches.
    pub async fn validate(&self, plaintext: &str) -> Result<ApiKey, ApiError> {
        let key_hash = self.hasher.hash(plaintext);

        let api_key = self
            .repository
            .find_by_hash(&key_hash)
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        if !api_key.is_valid(Utc::now()) {
            return Err(ApiError::InvalidCredentials);
        }

        // Best-effort bookkeeping off the critical path
        let repository = self.repository.clone();
        let api_key_id = api_key.api_key_id;
        tokio::spawn(async move {
            if let Err(e) = repository.touch_last_used(api_key_id).await {
                warn!(api_key_id = %api_key_id, error = %e, "failed to touch last_used_at");
            }
        });

        Ok(api_key)
    }

    /// Lists a user's keys (hashes included, plaintexts long gone).
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKey>, ApiError> {
        self.repository.list_for_user(user_id).await
    }

    /// Revokes a key: deactivation, not deletion.
    pub async fn revoke(&self, api_key_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.repository.revoke(api_key_id, user_id).await?;

        self.events.emit(&ApiKeyRevoked {
            api_key_id,
            user_id,
            occurred_at: Utc::now(),
        });

        Ok(())
    }
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService").finish_non_exhaustive()
    }
}
