//! # User Repository
//!
//! Data access for user accounts, the lockout counter, and the password
//! history.
//!
//! ## Identifier Lookups
//!
//! Email and phone columns hold **normalized** values; callers route raw
//! identifiers through [`shared::validation`] before lookup so uniqueness
//! holds on reads and writes alike.
//!
//! ## Error Handling
//!
//! | sqlx Error | ApiError Variant | HTTP Status |
//! |-----------------------|-----------------------|-------------|
//! | Unique constraint | `Conflict` | 409 |
//! | Other | `DatabaseError` | 500 |

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use shared::validation::LoginIdentifier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AccountLockout, NewUser, User};
use crate::repository::conflict_resource;

/// Repository for user-related database operations.
///
/// `Send + Sync` because `PgPool` is internally Arc-based; clone freely.
#[derive(Debug, Clone)]
pub struct UserRepository {
    /// PostgreSQL connection pool
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // USER OPERATIONS
    // =========================================================================

    /// Creates a new user.
    ///
    /// # Errors
    ///
    /// - `ApiError::Conflict` naming `email`, `username`, or `phone` when
    ///   the corresponding unique constraint fires
    pub async fn create(&self, new_user: NewUser) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                email, username, phone, password_hash, account_type,
                email_verified, phone_verified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.phone)
        .bind(&new_user.password_hash)
        .bind(new_user.account_type.as_str())
        .bind(new_user.email_verified)
        .bind(new_user.phone_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    let resource = conflict_resource(
                        &e,
                        &[
                            ("users_email_key", "email"),
                            ("users_username_key", "username"),
                            ("users_phone_key", "phone"),
                        ],
                        "user",
                    );
                    return ApiError::Conflict { resource };
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(user)
    }

    /// Finds a user by their unique ID.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by normalized email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by username.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by normalized E.164 phone.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by a classified login identifier.
    pub async fn find_by_identifier(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<User>, ApiError> {
        match identifier {
            LoginIdentifier::Email(email) => self.find_by_email(email).await,
            LoginIdentifier::Phone(phone) => self.find_by_phone(phone).await,
            LoginIdentifier::Username(username) => self.find_by_username(username).await,
        }
    }

    /// Updates the last-login timestamp after successful authentication.
    pub async fn update_last_login(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replaces the password hash and clears any forced expiry.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1,
                password_expires_at = NULL,
                updated_at = NOW()
            WHERE user_id = $2
            "#,
        )
        .bind(new_password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    /// Sets the email verification flag.
    pub async fn set_email_verified(&self, user_id: Uuid, verified: bool) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE users SET email_verified = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(verified)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets the phone verification flag.
    pub async fn set_phone_verified(&self, user_id: Uuid, verified: bool) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE users SET phone_verified = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(verified)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a TOTP secret for a user starting 2FA enrollment.
    ///
    /// `totp_enabled` stays false until the user proves possession with one
    /// valid code.
    pub async fn set_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET totp_secret = $1, updated_at = NOW() WHERE user_id = $2")
            .bind(secret)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Flips the 2FA enablement flag.
    pub async fn set_totp_enabled(&self, user_id: Uuid, enabled: bool) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET totp_enabled = $1, updated_at = NOW() WHERE user_id = $2")
            .bind(enabled)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Activates or deactivates an account.
    ///
    /// Deactivation halts login and refresh; already-issued access tokens
    /// stay valid until expiry unless blacklisted.
    pub async fn set_active(&self, user_id: Uuid, active: bool) -> Result<(), ApiError> {
        let result =
            sqlx::query("UPDATE users SET is_active = $1, updated_at = NOW() WHERE user_id = $2")
                .bind(active)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    // =========================================================================
    // PASSWORD HISTORY
    // =========================================================================

    /// Records a retired password hash.
    pub async fn add_password_history(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO password_history (user_id, password_hash) VALUES ($1, $2)")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Returns the most recent `limit` retired hashes for reuse checks.
    pub async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<String>, ApiError> {
        let hashes: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT password_hash FROM password_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hashes.into_iter().map(|(h,)| h).collect())
    }

    // =========================================================================
    // ACCOUNT LOCKOUT
    // =========================================================================

    /// Loads the lockout row, if any.
    pub async fn find_lockout(&self, user_id: Uuid) -> Result<Option<AccountLockout>, ApiError> {
        let lockout =
            sqlx::query_as::<_, AccountLockout>("SELECT * FROM account_lockouts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(lockout)
    }

    /// Records a failed sign-in attempt.
    ///
    /// The upsert restarts the counter when the previous failure is older
    /// than the reset window (`window_start`), otherwise increments it.
    /// Returns the updated row so the caller can decide whether to lock.
    pub async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> Result<AccountLockout, ApiError> {
        let lockout = sqlx::query_as::<_, AccountLockout>(
            r#"
            INSERT INTO account_lockouts (user_id, failed_attempts, last_failed_attempt)
            VALUES ($1, 1, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET failed_attempts = CASE
                    WHEN account_lockouts.last_failed_attempt < $2 THEN 1
                    ELSE account_lockouts.failed_attempts + 1
                END,
                last_failed_attempt = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(lockout)
    }

    /// Sets the lock expiry after the threshold was reached.
    pub async fn lock_account(
        &self,
        user_id: Uuid,
        locked_until: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        sqlx::query("UPDATE account_lockouts SET locked_until = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(locked_until)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clears the counter after a successful sign-in.
    pub async fn clear_lockout(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM account_lockouts WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::domain::{AccountType, NewUser};

    // Query-level behavior needs a live database; these cover the DTO
    // plumbing the queries bind from.

    #[test]
    fn test_new_user_passwordless_has_no_hash() {
        let new_user = NewUser {
            email: "bob@example.com".to_string(),
            username: "bob".to_string(),
            phone: None,
            password_hash: None,
            account_type: AccountType::Human,
            email_verified: true,
            phone_verified: false,
        };

        assert!(new_user.password_hash.is_none());
        assert!(new_user.email_verified);
    }

    #[test]
    fn test_new_user_account_type_binding() {
        let new_user = NewUser {
            email: "svc@example.com".to_string(),
            username: "svc".to_string(),
            phone: None,
            password_hash: None,
            account_type: AccountType::Service,
            email_verified: false,
            phone_verified: false,
        };

        assert_eq!(new_user.account_type.as_str(), "service");
    }
}
