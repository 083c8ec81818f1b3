//! # API Key Repository
//!
//! Data access for user-bound API keys. Lookups go by HMAC digest; the
//! plaintext never reaches this layer.

use shared::errors::ApiError;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ApiKey, NewApiKey};

/// Repository for API key operations.
#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a freshly issued key.
    pub async fn create(&self, new_key: NewApiKey) -> Result<ApiKey, ApiError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (
                user_id, application_id, name, key_hash, key_prefix,
                scopes, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new_key.user_id)
        .bind(new_key.application_id)
        .bind(&new_key.name)
        .bind(&new_key.key_hash)
        .bind(&new_key.key_prefix)
        .bind(Json(&new_key.scopes))
        .bind(new_key.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    /// Finds a key by the HMAC digest of its plaintext.
    ///
    /// Returns the row regardless of validity; the service applies
    /// `is_valid()` so revoked and expired keys fail identically to
    /// unknown ones.
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, ApiError> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    /// Lists a user's keys, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, ApiError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Bumps `last_used_at`. Fired from a detached task after successful
    /// validation; failures are logged and swallowed there (fail open).
    pub async fn touch_last_used(&self, api_key_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE api_key_id = $1")
            .bind(api_key_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Revokes a key (revoke = deactivate; rows are kept for audit).
    ///
    /// Scoped by owner so one user cannot revoke another's key.
    pub async fn revoke(&self, api_key_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_active = FALSE WHERE api_key_id = $1 AND user_id = $2",
        )
        .bind(api_key_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("api_key:{}", api_key_id),
            });
        }

        Ok(())
    }
}
