//! # Application Service
//!
//! Enforces the tenant boundary: resolves applications by id or machine
//! secret, gates inactive tenants, and manages the per-application user
//! profiles (auto-provisioned on first cross-app access, ban-aware).

use serde::Serialize;
use shared::crypto::{self, TokenHasher};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{Application, NewApplication, UserApplicationProfile};
use crate::repository::ApplicationRepository;

/// Result of registering an application: the row plus the one-time
/// plaintext secret.
#[derive(Debug)]
pub struct RegisteredApplication {
    /// The stored row
    pub application: Application,
    /// `app_` secret plaintext, shown to the operator exactly once
    pub secret: String,
}

/// Per-application auth configuration exposed over RPC.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAuthConfig {
    /// The tenant
    pub application_id: Uuid,
    /// Machine-readable name
    pub name: String,
    /// Whether new sessions may be minted for this scope
    pub is_active: bool,
    /// Callback URLs for cross-application redirects
    pub callback_urls: Vec<String>,
    /// RPC scope restriction, when configured
    pub allowed_rpc_scopes: Option<Vec<String>>,
}

/// Tenant resolution and profile management.
#[derive(Clone)]
pub struct ApplicationService {
    repository: ApplicationRepository,
    hasher: TokenHasher,
}

impl ApplicationService {
    /// Creates the service over its collaborators.
    pub fn new(repository: ApplicationRepository, hasher: TokenHasher) -> Self {
        Self { repository, hasher }
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolves an active application by id.
    ///
    /// Inactive tenants fail with `not_found`: callers cannot distinguish
    /// a disabled tenant from a missing one.
    pub async fn resolve_active(&self, application_id: Uuid) -> Result<Application, ApiError> {
        let app = self
            .repository
            .find_by_id(application_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("application:{}", application_id),
            })?;

        Ok(app)
    }

    /// Resolves an application by its presented `app_` secret.
    ///
    /// Inactive applications fail exactly like unknown secrets.
    pub async fn resolve_by_secret(&self, secret_plaintext: &str) -> Result<Application, ApiError> {
        let secret_hash = self.hasher.hash(secret_plaintext);

        let app = self
            .repository
            .find_by_secret_hash(&secret_hash)
            .await?
            .filter(|a| a.is_active)
            .ok_or(ApiError::InvalidCredentials)?;

        Ok(app)
    }

    /// Auth configuration for RPC consumers.
    pub async fn auth_config(&self, application_id: Uuid) -> Result<ApplicationAuthConfig, ApiError> {
        let app = self.resolve_active(application_id).await?;

        Ok(ApplicationAuthConfig {
            application_id: app.application_id,
            name: app.name,
            is_active: app.is_active,
            callback_urls: app.callback_urls.0,
            allowed_rpc_scopes: app.allowed_rpc_scopes.map(|j| j.0),
        })
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers an application and mints its machine secret.
    pub async fn register(
        &self,
        name: &str,
        display_name: &str,
        callback_urls: Vec<String>,
        owner_user_id: Option<Uuid>,
        allowed_rpc_scopes: Option<Vec<String>>,
    ) -> Result<RegisteredApplication, ApiError> {
        let secret = crypto::generate_app_secret();

        let application = self
            .repository
            .create(NewApplication {
                name: name.to_string(),
                display_name: display_name.to_string(),
                callback_urls,
                secret_hash: self.hasher.hash(&secret),
                secret_prefix: crypto::key_prefix(&secret),
                is_system: false,
                owner_user_id,
                allowed_rpc_scopes,
            })
            .await?;

        Ok(RegisteredApplication {
            application,
            secret,
        })
    }

    // =========================================================================
    // USER APPLICATION PROFILES
    // =========================================================================

    /// Fetches a user's tenant profile, creating it on first access.
    ///
    /// # Errors
    ///
    /// - `ApiError::AccessDenied` when the profile is banned or inactive
    pub async fn get_or_create_profile(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<UserApplicationProfile, ApiError> {
        // The tenant must exist and be active before provisioning
        self.resolve_active(application_id).await?;

        let profile = self
            .repository
            .get_or_create_profile(user_id, application_id)
            .await?;

        if profile.is_banned || !profile.is_active {
            return Err(ApiError::AccessDenied);
        }

        Ok(profile)
    }
}

impl std::fmt::Debug for ApplicationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationService").finish_non_exhaustive()
    }
}
