//! # OAuth Token Repository
//!
//! Authorization codes, opaque access/refresh token rows, and device
//! codes. Every state transition that must happen at most once is a
//! conditional `UPDATE`; the database linearizes the race.
//!
//! ## Redemption Outcomes
//!
//! ```text
//! redeem_code(hash)
//!   ├── row flipped used=FALSE→TRUE ──► Redeemed       (mint tokens)
//!   ├── row exists, already used ─────► Replayed       (invalid_grant + cascade-revoke)
//!   ├── row exists, expired ──────────► Expired        (invalid_grant)
//!   └── no row ───────────────────────► Unknown        (invalid_grant)
//! ```

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    AuthorizationCode, DeviceCode, NewAuthorizationCode, NewDeviceCode, NewOAuthAccessToken,
    NewOAuthRefreshToken, OAuthAccessToken, OAuthRefreshToken,
};

/// Outcome of an authorization-code redemption attempt.
#[derive(Debug)]
pub enum CodeRedemption {
    /// This caller won the conditional update; mint tokens.
    Redeemed(AuthorizationCode),
    /// The code was already redeemed once: replay. The caller must revoke
    /// any tokens minted from the first redemption.
    Replayed(AuthorizationCode),
    /// The code exists but expired unredeemed.
    Expired,
    /// No such code.
    Unknown,
}

/// Outcome of a refresh-token rotation attempt.
#[derive(Debug)]
pub enum RefreshRotation {
    /// The old token was live and is now revoked.
    Rotated(OAuthRefreshToken),
    /// The token is unknown, revoked, or expired.
    Invalid,
}

/// Repository for OAuth grant state.
#[derive(Debug, Clone)]
pub struct OAuthTokenRepository {
    pool: PgPool,
}

impl OAuthTokenRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // AUTHORIZATION CODES
    // =========================================================================

    /// Mints an authorization code row.
    pub async fn create_code(
        &self,
        new_code: NewAuthorizationCode,
    ) -> Result<AuthorizationCode, ApiError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            INSERT INTO authorization_codes (
                code_hash, client_id, user_id, redirect_uri, scope,
                code_challenge, code_challenge_method, nonce, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&new_code.code_hash)
        .bind(&new_code.client_id)
        .bind(new_code.user_id)
        .bind(&new_code.redirect_uri)
        .bind(&new_code.scope)
        .bind(&new_code.code_challenge)
        .bind(&new_code.code_challenge_method)
        .bind(&new_code.nonce)
        .bind(new_code.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(code)
    }

    /// Atomically redeems a code.
    ///
    /// The single conditional update is the serialization point: of two
    /// concurrent redemptions, exactly one sees `Redeemed` and the other
    /// `Replayed`.
    pub async fn redeem_code(&self, code_hash: &str) -> Result<CodeRedemption, ApiError> {
        let redeemed = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            UPDATE authorization_codes
            SET used = TRUE
            WHERE code_hash = $1 AND used = FALSE AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(code) = redeemed {
            return Ok(CodeRedemption::Redeemed(code));
        }

        let existing = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code_hash = $1",
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some(code) if code.used => CodeRedemption::Replayed(code),
            Some(_) => CodeRedemption::Expired,
            None => CodeRedemption::Unknown,
        })
    }

    /// Revokes every token minted from a code (replay response, P1).
    pub async fn revoke_tokens_for_code(&self, code_id: Uuid) -> Result<u64, ApiError> {
        let mut tx = self.pool.begin().await?;

        let access = sqlx::query(
            r#"
            UPDATE oauth_access_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE auth_code_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(code_id)
        .execute(&mut *tx)
        .await?;

        let refresh = sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE auth_code_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(code_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }

    // =========================================================================
    // ACCESS / REFRESH TOKENS
    // =========================================================================

    /// Records an issued access token.
    pub async fn create_access_token(
        &self,
        new_token: NewOAuthAccessToken,
    ) -> Result<OAuthAccessToken, ApiError> {
        let token = sqlx::query_as::<_, OAuthAccessToken>(
            r#"
            INSERT INTO oauth_access_tokens (
                token_hash, client_id, user_id, scope, expires_at, auth_code_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new_token.token_hash)
        .bind(&new_token.client_id)
        .bind(new_token.user_id)
        .bind(&new_token.scope)
        .bind(new_token.expires_at)
        .bind(new_token.auth_code_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Records an issued refresh token.
    pub async fn create_refresh_token(
        &self,
        new_token: NewOAuthRefreshToken,
    ) -> Result<OAuthRefreshToken, ApiError> {
        let token = sqlx::query_as::<_, OAuthRefreshToken>(
            r#"
            INSERT INTO oauth_refresh_tokens (
                token_hash, client_id, user_id, scope, expires_at,
                access_token_id, auth_code_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new_token.token_hash)
        .bind(&new_token.client_id)
        .bind(new_token.user_id)
        .bind(&new_token.scope)
        .bind(new_token.expires_at)
        .bind(new_token.access_token_id)
        .bind(new_token.auth_code_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Finds an access token row by hash, in any state.
    pub async fn find_access_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OAuthAccessToken>, ApiError> {
        let token = sqlx::query_as::<_, OAuthAccessToken>(
            "SELECT * FROM oauth_access_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Finds a refresh token row by hash, in any state.
    pub async fn find_refresh_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OAuthRefreshToken>, ApiError> {
        let token = sqlx::query_as::<_, OAuthRefreshToken>(
            "SELECT * FROM oauth_refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Rotates a refresh token: conditionally revokes the live row.
    ///
    /// The reuse check is the conditional predicate itself — read inside
    /// the same statement that writes, as the rotation must observe
    /// `revoked_at` before accepting.
    pub async fn rotate_refresh(&self, token_hash: &str) -> Result<RefreshRotation, ApiError> {
        let revoked = sqlx::query_as::<_, OAuthRefreshToken>(
            r#"
            UPDATE oauth_refresh_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE token_hash = $1
              AND is_active = TRUE
              AND revoked_at IS NULL
              AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match revoked {
            Some(token) => RefreshRotation::Rotated(token),
            None => RefreshRotation::Invalid,
        })
    }

    /// Revokes a refresh token and the access token paired with it
    /// (RFC 7009 cascade).
    pub async fn revoke_refresh_cascade(
        &self,
        refresh: &OAuthRefreshToken,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE token_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(refresh.token_id)
        .execute(&mut *tx)
        .await?;

        if let Some(access_token_id) = refresh.access_token_id {
            sqlx::query(
                r#"
                UPDATE oauth_access_tokens
                SET is_active = FALSE, revoked_at = NOW()
                WHERE token_id = $1 AND revoked_at IS NULL
                "#,
            )
            .bind(access_token_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Revokes a single access token row.
    pub async fn revoke_access_token(&self, token_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE oauth_access_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE token_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // DEVICE CODES
    // =========================================================================

    /// Starts a device grant.
    pub async fn create_device_code(
        &self,
        new_code: NewDeviceCode,
    ) -> Result<DeviceCode, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            r#"
            INSERT INTO device_codes (
                device_code_hash, user_code, client_id, scope, status,
                verification_uri, interval_seconds, expires_at
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new_code.device_code_hash)
        .bind(&new_code.user_code)
        .bind(&new_code.client_id)
        .bind(&new_code.scope)
        .bind(&new_code.verification_uri)
        .bind(new_code.interval_seconds)
        .bind(new_code.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(code)
    }

    /// Finds a device grant by the hash of its device code.
    pub async fn find_device_by_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<DeviceCode>, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            "SELECT * FROM device_codes WHERE device_code_hash = $1",
        )
        .bind(device_code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Finds a pending device grant by its human-typable user code.
    pub async fn find_pending_by_user_code(
        &self,
        user_code: &str,
    ) -> Result<Option<DeviceCode>, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            r#"
            SELECT * FROM device_codes
            WHERE user_code = $1 AND status = 'pending' AND expires_at > NOW()
            "#,
        )
        .bind(user_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// User approved the grant. Conditional on `pending`, so approval and
    /// denial races collapse to one winner.
    pub async fn approve_device(
        &self,
        device_code_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'authorized', user_id = $2
            WHERE device_code_id = $1 AND status = 'pending' AND expires_at > NOW()
            "#,
        )
        .bind(device_code_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// User declined the grant (terminal).
    pub async fn deny_device(&self, device_code_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'denied'
            WHERE device_code_id = $1 AND status = 'pending'
            "#,
        )
        .bind(device_code_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminates an authorized grant after minting tokens. Conditional on
    /// `authorized`: a second racing poll mints nothing.
    pub async fn consume_device(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<DeviceCode>, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            r#"
            UPDATE device_codes
            SET status = 'consumed'
            WHERE device_code_hash = $1 AND status = 'authorized'
            RETURNING *
            "#,
        )
        .bind(device_code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Marks an overdue pending grant expired.
    pub async fn expire_device(&self, device_code_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'expired'
            WHERE device_code_id = $1 AND status = 'pending'
            "#,
        )
        .bind(device_code_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // CLEANUP
    // =========================================================================

    /// Deletes up to `batch` expired authorization codes.
    pub async fn delete_expired_codes(&self, batch: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM authorization_codes
            WHERE code_id IN (
                SELECT code_id FROM authorization_codes
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

    /// Deletes up to `batch` expired refresh tokens (and their expired
    /// access rows).
    pub async fn delete_expired_tokens(&self, batch: i64) -> Result<u64, ApiError> {
        let mut tx = self.pool.begin().await?;

        let access = sqlx::query(
            r#"
            DELETE FROM oauth_access_tokens
            WHERE token_id IN (
                SELECT token_id FROM oauth_access_tokens
                WHERE expires_at < NOW()
                LIMIT $1
            )
            "#,
        )
        .bind(batch)
        .execute(&mut *tx)
        .await?;

        let refresh = sqlx::query(
            r#"
            DELETE FROM oauth_refresh_tokens
            WHERE token_id IN (
                SELECT token_id FROM oauth_refresh_tokens
                WHERE expires_at < NOW()
                LIMIT $1
            )
            "#,
        )
        .bind(batch)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }

    /// Deletes up to `batch` finished device codes.
    pub async fn delete_expired_device_codes(&self, batch: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM device_codes
            WHERE device_code_id IN (
                SELECT device_code_id FROM device_codes
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
