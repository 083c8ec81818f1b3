//! # Application Repository
//!
//! Data access for the tenant boundary: applications, their machine
//! secrets, email profiles, and per-tenant user profiles.

use shared::errors::ApiError;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Application, EmailProfile, NewApplication, UserApplicationProfile};
use crate::repository::map_insert_error;

/// Repository for application-scoped database operations.
#[derive(Debug, Clone)]
pub struct ApplicationRepository {
    pool: PgPool,
}

impl ApplicationRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // APPLICATIONS
    // =========================================================================

    /// Registers a new application.
    ///
    /// # Errors
    ///
    /// - `ApiError::Conflict` when the name is taken
    pub async fn create(&self, new_app: NewApplication) -> Result<Application, ApiError> {
        let app = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (
                name, display_name, callback_urls, secret_hash, secret_prefix,
                is_system, owner_user_id, allowed_rpc_scopes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&new_app.name)
        .bind(&new_app.display_name)
        .bind(Json(&new_app.callback_urls))
        .bind(&new_app.secret_hash)
        .bind(&new_app.secret_prefix)
        .bind(new_app.is_system)
        .bind(new_app.owner_user_id)
        .bind(new_app.allowed_rpc_scopes.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "application name"))?;

        Ok(app)
    }

    /// Finds an application by id.
    pub async fn find_by_id(&self, application_id: Uuid) -> Result<Option<Application>, ApiError> {
        let app = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(app)
    }

    /// Finds an application by unique name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Application>, ApiError> {
        let app = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(app)
    }

    /// Finds an application by the HMAC digest of its machine secret.
    ///
    /// The secret itself never reaches the repository; the interceptor
    /// hashes the presented credential first.
    pub async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Application>, ApiError> {
        let app = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE secret_hash = $1",
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(app)
    }

    /// Activates or deactivates an application.
    ///
    /// Deactivation stops new sessions and exchanges for the scope;
    /// existing tokens run out naturally.
    pub async fn set_active(&self, application_id: Uuid, active: bool) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE applications SET is_active = $1, updated_at = NOW() WHERE application_id = $2",
        )
        .bind(active)
        .bind(application_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("application:{}", application_id),
            });
        }

        Ok(())
    }

    // =========================================================================
    // EMAIL PROFILES
    // =========================================================================

    /// Returns the application's default email profile, if configured.
    pub async fn find_default_email_profile(
        &self,
        application_id: Uuid,
    ) -> Result<Option<EmailProfile>, ApiError> {
        let profile = sqlx::query_as::<_, EmailProfile>(
            r#"
            SELECT * FROM email_profiles
            WHERE application_id = $1 AND is_default = TRUE
            LIMIT 1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    // =========================================================================
    // USER APPLICATION PROFILES
    // =========================================================================

    /// Finds a user's profile inside a tenant.
    pub async fn find_profile(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<UserApplicationProfile>, ApiError> {
        let profile = sqlx::query_as::<_, UserApplicationProfile>(
            r#"
            SELECT * FROM user_application_profiles
            WHERE user_id = $1 AND application_id = $2
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Gets a user's tenant profile, creating it on first cross-app access.
    ///
    /// The `ON CONFLICT` path makes concurrent first accesses converge on
    /// one row; both callers get the same profile back.
    pub async fn get_or_create_profile(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<UserApplicationProfile, ApiError> {
        let profile = sqlx::query_as::<_, UserApplicationProfile>(
            r#"
            INSERT INTO user_application_profiles (user_id, application_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, application_id) DO UPDATE
            SET last_access_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Bumps the profile's last-access timestamp.
    pub async fn touch_profile(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE user_application_profiles
            SET last_access_at = NOW()
            WHERE user_id = $1 AND application_id = $2
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-bans or unbans a user inside a tenant.
    pub async fn set_banned(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        banned: bool,
        reason: Option<&str>,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE user_application_profiles
            SET is_banned = $3, ban_reason = $4, updated_at = NOW()
            WHERE user_id = $1 AND application_id = $2
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .bind(banned)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("profile:{}:{}", user_id, application_id),
            });
        }

        Ok(())
    }
}
