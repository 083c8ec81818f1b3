//! # Application (Tenant) Entities
//!
//! The tenant boundary of the gateway. An application is a logically
//! isolated consumer of the identity service: it owns OAuth clients and
//! email profiles, carries its own machine credential (`app_` secret), and
//! scopes user profiles and roles.
//!
//! Deactivating an application cascades to refusal of new sessions for its
//! scope; already-issued tokens stay valid until natural expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// APPLICATION
// =============================================================================

/// Tenant root record (`applications` table).
#[derive(Debug, Clone, FromRow)]
pub struct Application {
    /// Unique identifier
    pub application_id: Uuid,
    /// Machine-readable name, unique
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Allowed callback URLs for cross-application redirects
    pub callback_urls: Json<Vec<String>>,
    /// HMAC digest of the `app_` machine secret
    pub secret_hash: String,
    /// Stored identification prefix of the secret (first 12 chars)
    pub secret_prefix: String,
    /// When false, no new sessions or exchanges are minted for this scope
    pub is_active: bool,
    /// System applications are non-deletable
    pub is_system: bool,
    /// Optional owning user
    pub owner_user_id: Option<Uuid>,
    /// When non-empty, RPC calls authenticated with this application's
    /// secret may only use methods mapped to these scopes
    pub allowed_rpc_scopes: Option<Json<Vec<String>>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Whether an RPC scope is permitted for this application's secret.
    ///
    /// `None` means unrestricted; an empty list denies everything.
    pub fn allows_rpc_scope(&self, scope: &str) -> bool {
        match &self.allowed_rpc_scopes {
            None => true,
            Some(Json(scopes)) => scopes.iter().any(|s| s == scope),
        }
    }
}

/// Data required to register an application. The secret must be pre-hashed;
/// its plaintext is returned to the operator exactly once.
#[derive(Debug, Clone)]
pub struct NewApplication {
    /// Machine-readable name (unique)
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Allowed callback URLs
    pub callback_urls: Vec<String>,
    /// HMAC digest of the generated secret
    pub secret_hash: String,
    /// First 12 chars of the secret
    pub secret_prefix: String,
    /// Marks built-in applications
    pub is_system: bool,
    /// Optional owning user
    pub owner_user_id: Option<Uuid>,
    /// Optional RPC scope restriction
    pub allowed_rpc_scopes: Option<Vec<String>>,
}

// =============================================================================
// USER APPLICATION PROFILE
// =============================================================================

/// Per-tenant user profile (`user_application_profiles` table).
///
/// Auto-created on first cross-application access; `(user_id,
/// application_id)` is unique. A ban is soft: the row stays, lookups must
/// respect it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApplicationProfile {
    /// Row id
    pub profile_id: Uuid,
    /// The user
    pub user_id: Uuid,
    /// The tenant
    pub application_id: Uuid,
    /// Display name inside this application
    pub display_name: Option<String>,
    /// Avatar URL inside this application
    pub avatar: Option<String>,
    /// Nickname inside this application
    pub nickname: Option<String>,
    /// Application-defined opaque metadata
    pub metadata: Json<serde_json::Value>,
    /// Role names local to this application
    pub app_roles: Json<Vec<String>>,
    /// Profile active flag
    pub is_active: bool,
    /// Soft ban flag; banned profiles fail lookups with `access_denied`
    pub is_banned: bool,
    /// Operator-supplied ban reason
    pub ban_reason: Option<String>,
    /// Bumped on every access through this tenant
    pub last_access_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// EMAIL PROFILE
// =============================================================================

/// Per-application message sender profile (`email_profiles` table).
///
/// Selected by the messaging façade so OTP and notification mail carries
/// the tenant's branding. Applications without a profile fall back to the
/// gateway default.
#[derive(Debug, Clone, FromRow)]
pub struct EmailProfile {
    /// Row id
    pub email_profile_id: Uuid,
    /// Owning application
    pub application_id: Uuid,
    /// Sender display name
    pub from_name: String,
    /// Sender address
    pub from_address: String,
    /// Reply-to address, if distinct
    pub reply_to: Option<String>,
    /// Whether this profile is the application default
    pub is_default: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_app(allowed: Option<Vec<&str>>) -> Application {
        Application {
            application_id: Uuid::new_v4(),
            name: "storefront".to_string(),
            display_name: "Storefront".to_string(),
            callback_urls: Json(vec!["https://store.example.com/sso".to_string()]),
            secret_hash: "digest".to_string(),
            secret_prefix: "app_AbCdEfGh".to_string(),
            is_active: true,
            is_system: false,
            owner_user_id: None,
            allowed_rpc_scopes: allowed
                .map(|v| Json(v.into_iter().map(str::to_string).collect())),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unrestricted_app_allows_any_rpc_scope() {
        let app = sample_app(None);
        assert!(app.allows_rpc_scope("users:read"));
        assert!(app.allows_rpc_scope("auth:register"));
    }

    #[test]
    fn test_restricted_app_checks_membership() {
        let app = sample_app(Some(vec!["tokens:validate", "users:read"]));
        assert!(app.allows_rpc_scope("users:read"));
        assert!(!app.allows_rpc_scope("auth:register"));
    }

    #[test]
    fn test_empty_restriction_denies_everything() {
        let app = sample_app(Some(vec![]));
        assert!(!app.allows_rpc_scope("users:read"));
    }
}
