//! # OAuth Client Repository
//!
//! Data access for registered OAuth clients and user consent grants.

use shared::errors::ApiError;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{OAuthClient, UserConsent};
use crate::repository::map_insert_error;

/// Repository for OAuth clients and consents.
#[derive(Debug, Clone)]
pub struct OAuthClientRepository {
    pool: PgPool,
}

impl OAuthClientRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // CLIENTS
    // =========================================================================

    /// Registers a client. The secret hash, when present, must be
    /// pre-computed; public clients pass `None`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        client_id: &str,
        application_id: Uuid,
        client_secret_hash: Option<&str>,
        client_type: &str,
        redirect_uris: &[String],
        allowed_grant_types: &[String],
        allowed_scopes: &[String],
        default_scopes: &[String],
    ) -> Result<OAuthClient, ApiError> {
        let client = sqlx::query_as::<_, OAuthClient>(
            r#"
            INSERT INTO oauth_clients (
                client_id, application_id, client_secret_hash, client_type,
                redirect_uris, allowed_grant_types, allowed_scopes, default_scopes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(application_id)
        .bind(client_secret_hash)
        .bind(client_type)
        .bind(Json(redirect_uris))
        .bind(Json(allowed_grant_types))
        .bind(Json(allowed_scopes))
        .bind(Json(default_scopes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "client_id"))?;

        Ok(client)
    }

    /// Finds a client by its public identifier.
    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<OAuthClient>, ApiError> {
        let client =
            sqlx::query_as::<_, OAuthClient>("SELECT * FROM oauth_clients WHERE client_id = $1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(client)
    }

    // =========================================================================
    // CONSENTS
    // =========================================================================

    /// Returns the user's live consent rows for a client, newest first.
    ///
    /// The caller checks coverage ([`UserConsent::covers`]) against the
    /// requested scope set.
    pub async fn find_consents(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Vec<UserConsent>, ApiError> {
        let consents = sqlx::query_as::<_, UserConsent>(
            r#"
            SELECT * FROM user_consents
            WHERE user_id = $1 AND client_id = $2 AND revoked_at IS NULL
            ORDER BY granted_at DESC
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(consents)
    }

    /// Records a consent grant.
    pub async fn grant_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
    ) -> Result<UserConsent, ApiError> {
        let consent = sqlx::query_as::<_, UserConsent>(
            r#"
            INSERT INTO user_consents (user_id, client_id, scopes)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(Json(scopes))
        .fetch_one(&self.pool)
        .await?;

        Ok(consent)
    }

    /// Revokes all of a user's consents for a client (monotone).
    pub async fn revoke_consents(&self, user_id: Uuid, client_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE user_consents
            SET revoked_at = NOW()
            WHERE user_id = $1 AND client_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
