//! # Token Blacklist Repository
//!
//! The authoritative store behind the cached blacklist. The cache serves
//! the hot path; when it is unavailable the check **fails closed** against
//! this table.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::BlacklistEntry;

/// Repository for blacklist rows.
#[derive(Debug, Clone)]
pub struct BlacklistRepository {
    pool: PgPool,
}

impl BlacklistRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Blacklists a token id until its natural expiry.
    ///
    /// Idempotent: re-inserting the same hash keeps the earlier row.
    pub async fn insert(
        &self,
        token_hash: &str,
        user_id: Option<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO token_blacklist (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether a token id is blacklisted and the entry has not lapsed.
    pub async fn is_blacklisted(&self, token_hash: &str) -> Result<bool, ApiError> {
        let row: Option<BlacklistEntry> = sqlx::query_as(
            r#"
            SELECT * FROM token_blacklist
            WHERE token_hash = $1 AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Deletes up to `batch` lapsed entries. Called by the cleanup
    /// sweeper; entries self-expire logically before that.
    pub async fn delete_expired(&self, batch: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM token_blacklist
            WHERE token_hash IN (
                SELECT token_hash FROM token_blacklist
                WHERE expires_at < NOW()
                LIMIT $1
            )
            "#,
        )
        .bind(batch)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
