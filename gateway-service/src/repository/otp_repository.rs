//! # OTP Repository
//!
//! Hashed-at-rest one-time PIN rows keyed by `(identity, type)`.

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::{NewOtp, Otp, OtpIdentity, OtpType};

/// Repository for OTP rows.
#[derive(Debug, Clone)]
pub struct OtpRepository {
    pool: PgPool,
}

impl OtpRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a freshly generated code.
    pub async fn create(&self, new_otp: NewOtp) -> Result<Otp, ApiError> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            INSERT INTO otps (email, phone, code_hash, otp_type, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new_otp.identity.email())
        .bind(new_otp.identity.phone())
        .bind(&new_otp.code_hash)
        .bind(new_otp.otp_type.as_str())
        .bind(new_otp.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(otp)
    }

    /// Finds the newest unused, unexpired code matching `(identity, type,
    /// code_hash)`.
    ///
    /// The hash is part of the predicate, so a wrong code and an unknown
    /// identity produce the same `None` — callers must not disclose which.
    pub async fn find_matching(
        &self,
        identity: &OtpIdentity,
        otp_type: OtpType,
        code_hash: &str,
    ) -> Result<Option<Otp>, ApiError> {
        let otp = sqlx::query_as::<_, Otp>(
            r#"
            SELECT * FROM otps
            WHERE email IS NOT DISTINCT FROM $1
              AND phone IS NOT DISTINCT FROM $2
              AND otp_type = $3
              AND code_hash = $4
              AND used = FALSE
              AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(identity.email())
        .bind(identity.phone())
        .bind(otp_type.as_str())
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(otp)
    }

    /// Consumes a verified code and invalidates its unused siblings of the
    /// same `(identity, type)`.
    ///
    /// Runs in one transaction. The `used = FALSE` predicate on the target
    /// row makes consumption single-use under concurrency: the second
    /// verifier affects zero rows and gets `false`.
    pub async fn consume(
        &self,
        otp_id: uuid::Uuid,
        identity: &OtpIdentity,
        otp_type: OtpType,
    ) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query("UPDATE otps SET used = TRUE WHERE otp_id = $1 AND used = FALSE")
            .bind(otp_id)
            .execute(&mut *tx)
            .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Sibling invalidation: an older outstanding code must not verify
        // after a newer one already did
        sqlx::query(
            r#"
            UPDATE otps
            SET used = TRUE
            WHERE used = FALSE
              AND email IS NOT DISTINCT FROM $1
              AND phone IS NOT DISTINCT FROM $2
              AND otp_type = $3
            "#,
        )
        .bind(identity.email())
        .bind(identity.phone())
        .bind(otp_type.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    /// Deletes up to `batch` expired rows. Called by the cleanup sweeper.
    pub async fn delete_expired(&self, batch: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM otps
            WHERE otp_id IN (
                SELECT otp_id FROM otps
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
