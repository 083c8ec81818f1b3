//! # API Key Entity
//!
//! Long-lived opaque credentials bound to a user, prefixed `agw_`, gated by
//! a scope set. The plaintext is returned exactly once at issuance; the row
//! stores its HMAC digest and the first 12 characters for operator UX.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Scope wildcard granting every scope.
pub const SCOPE_ALL: &str = "all";

// =============================================================================
// API KEY
// =============================================================================

/// API key record (`api_keys` table).
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    /// Unique identifier
    pub api_key_id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Optional tenant binding
    pub application_id: Option<Uuid>,
    /// Operator-supplied label
    pub name: String,
    /// HMAC digest of the plaintext key
    pub key_hash: String,
    /// First 12 chars of the plaintext, for identification
    pub key_prefix: String,
    /// Granted scope labels (JSON array)
    pub scopes: Json<Vec<String>>,
    /// Revocation flag: revoke = deactivate
    pub is_active: bool,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Bumped best-effort on successful validation
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Valid ⇔ active ∧ (no expiry ∨ expiry in the future).
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }

    /// Whether the key grants a scope.
    ///
    /// True when the stored set contains the scope itself or the `all`
    /// wildcard.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.0.iter().any(|s| s == scope || s == SCOPE_ALL)
    }
}

/// Data required to issue a key; the plaintext never reaches the
/// repository.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    /// Owning user
    pub user_id: Uuid,
    /// Optional tenant binding
    pub application_id: Option<Uuid>,
    /// Operator-supplied label
    pub name: String,
    /// HMAC digest of the generated plaintext
    pub key_hash: String,
    /// First 12 chars of the plaintext
    pub key_prefix: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_key(scopes: Vec<&str>) -> ApiKey {
        ApiKey {
            api_key_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            application_id: None,
            name: "ci".to_string(),
            key_hash: "digest".to_string(),
            key_prefix: "agw_AbCdEfGh".to_string(),
            scopes: Json(scopes.into_iter().map(str::to_string).collect()),
            is_active: true,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_scope_membership() {
        let key = sample_key(vec!["users:read", "tokens:validate"]);
        assert!(key.has_scope("users:read"));
        assert!(key.has_scope("tokens:validate"));
        assert!(!key.has_scope("auth:register"));
    }

    #[test]
    fn test_all_wildcard_grants_everything() {
        let key = sample_key(vec!["all"]);
        assert!(key.has_scope("users:read"));
        assert!(key.has_scope("anything:whatsoever"));
    }

    #[test]
    fn test_empty_scopes_grant_nothing() {
        let key = sample_key(vec![]);
        assert!(!key.has_scope("users:read"));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut key = sample_key(vec!["all"]);

        assert!(key.is_valid(now));

        key.expires_at = Some(now + Duration::days(30));
        assert!(key.is_valid(now));

        key.expires_at = Some(now - Duration::seconds(1));
        assert!(!key.is_valid(now));

        key.expires_at = None;
        key.is_active = false;
        assert!(!key.is_valid(now));
    }
}
