//! # Session Repository
//!
//! The session ledger: refresh tokens materialized as device-bound rows.
//!
//! ## Rotation and Reuse Detection
//!
//! Refresh rotation is a two-step transaction: conditionally revoke the
//! old row (`WHERE revoked_at IS NULL AND expires_at > NOW()`), then
//! insert the replacement. The conditional update is the serialization
//! point — when it affects zero rows but the hash is known, the token was
//! **already rotated once**, which is the reuse signal that revokes the
//! whole family.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewSession, Session, SessionStats, SessionStatsBucket};

/// Outcome of a refresh rotation attempt.
#[derive(Debug)]
pub enum SessionRotation {
    /// The old session was live; it is now revoked and replaced.
    Rotated {
        /// The revoked predecessor
        revoked: Session,
        /// The freshly inserted session
        current: Session,
    },
    /// The hash matches a session that was already revoked or expired:
    /// a reuse attempt.
    Reused {
        /// The stale session that was presented
        session: Session,
    },
    /// No session carries this hash.
    Unknown,
}

/// Repository for the session ledger.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records a session at token issuance.
    pub async fn create(&self, new_session: NewSession) -> Result<Session, ApiError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (
                user_id, token_hash, access_token_jti, application_id,
                device_type, device_os, device_browser, ip_address,
                user_agent, session_name, last_active_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), $11)
            RETURNING *
            "#,
        )
        .bind(new_session.user_id)
        .bind(&new_session.token_hash)
        .bind(new_session.access_token_jti)
        .bind(new_session.application_id)
        .bind(&new_session.device_type)
        .bind(&new_session.device_os)
        .bind(&new_session.device_browser)
        .bind(&new_session.ip_address)
        .bind(&new_session.user_agent)
        .bind(&new_session.session_name)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Finds a live session by refresh-token hash.
    pub async fn find_valid_by_hash(&self, token_hash: &str) -> Result<Option<Session>, ApiError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Rotates a session: revoke the old row, insert the replacement.
    ///
    /// Runs in one transaction. The reuse check reads the old row's state
    /// through the conditional update itself, so two concurrent rotations
    /// of the same token collapse to one `Rotated` and one `Reused`.
    pub async fn rotate(
        &self,
        old_token_hash: &str,
        replacement: NewSession,
    ) -> Result<SessionRotation, ApiError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(old_token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(revoked) = revoked else {
            // Zero rows: distinguish reuse from an unknown token
            let stale = sqlx::query_as::<_, Session>(
                "SELECT * FROM sessions WHERE token_hash = $1",
            )
            .bind(old_token_hash)
            .fetch_optional(&mut *tx)
            .await?;

            tx.rollback().await?;

            return Ok(match stale {
                Some(session) => SessionRotation::Reused { session },
                None => SessionRotation::Unknown,
            });
        };

        let current = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (
                user_id, token_hash, access_token_jti, application_id,
                device_type, device_os, device_browser, ip_address,
                user_agent, session_name, last_active_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), $11)
            RETURNING *
            "#,
        )
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.access_token_jti)
        .bind(replacement.application_id)
        .bind(&replacement.device_type)
        .bind(&replacement.device_os)
        .bind(&replacement.device_browser)
        .bind(&replacement.ip_address)
        .bind(&replacement.user_agent)
        .bind(&replacement.session_name)
        .bind(replacement.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SessionRotation::Rotated { revoked, current })
    }

    /// Revokes one session by id, scoped to its owner.
    ///
    /// Idempotent: revoking an already-revoked session affects zero rows
    /// and returns the row unchanged (monotone transition).
    pub async fn revoke_by_id(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Session>, ApiError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE session_id = $1 AND user_id = $2 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Revokes the session holding a refresh-token hash.
    pub async fn revoke_by_hash(&self, token_hash: &str) -> Result<Option<Session>, ApiError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Revokes all of a user's live sessions, optionally sparing one
    /// ("sign out all other devices").
    ///
    /// Returns the revoked rows so the caller can cascade-blacklist the
    /// paired access tokens.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_session_id: Option<Uuid>,
    ) -> Result<Vec<Session>, ApiError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND ($2::uuid IS NULL OR session_id <> $2)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(except_session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Bumps the activity timestamp.
    pub async fn touch_activity(&self, session_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET last_active_at = NOW() WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Lists a user's active sessions, most recently active first.
    pub async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ApiError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            ORDER BY last_active_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Aggregates active-session counts by device class, OS, and browser.
    pub async fn stats_for_user(&self, user_id: Uuid) -> Result<SessionStats, ApiError> {
        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let by = |column: &str| {
            format!(
                r#"
                SELECT {column} AS label, COUNT(*) AS count FROM sessions
                WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
                GROUP BY {column}
                ORDER BY count DESC
                "#
            )
        };

        let by_device_type = sqlx::query_as::<_, SessionStatsBucket>(&by("device_type"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let by_os = sqlx::query_as::<_, SessionStatsBucket>(&by("device_os"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let by_browser = sqlx::query_as::<_, SessionStatsBucket>(&by("device_browser"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(SessionStats {
            total: total.0,
            by_device_type,
            by_os,
            by_browser,
        })
    }

    /// Deletes up to `batch` expired sessions. Called by the cleanup
    /// sweeper at low frequency.
    pub async fn delete_expired(&self, batch: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE session_id IN (
                SELECT session_id FROM sessions
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
