//! # RBAC Entities
//!
//! Roles, permissions, and their grant rows.
//!
//! ## Scoping Model
//!
//! A user-role grant carries a nullable `application_id`: `NULL` means the
//! role is held globally, any other value scopes it to one tenant. The
//! effective role set for `(user, application)` is the **union** of the
//! global grants and the grants for that application. There is no role
//! inheritance; admin-style roles carry explicit wildcard permissions.
//!
//! ## Wildcards
//!
//! The literal string `"*"` in a permission's `resource` and/or `action`
//! matches anything. No other string is magic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Wildcard marker in permission resource/action fields.
pub const WILDCARD: &str = "*";

// =============================================================================
// ROLE
// =============================================================================

/// A named bundle of permissions (`roles` table).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier
    pub role_id: Uuid,
    /// Machine-readable name, unique within its scope
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// NULL for global roles, otherwise the owning tenant
    pub application_id: Option<Uuid>,
    /// System roles (e.g. `admin`) are non-deletable
    pub is_system_role: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// PERMISSION
// =============================================================================

/// A `(resource, action)` capability (`permissions` table).
///
/// `name` is always `"{resource}.{action}"` and exists for display.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Permission {
    /// Unique identifier
    pub permission_id: Uuid,
    /// Resource label, or `"*"`
    pub resource: String,
    /// Action label, or `"*"`
    pub action: String,
    /// `"{resource}.{action}"`
    pub name: String,
}

impl Permission {
    /// Whether this permission grants `(resource, action)`.
    ///
    /// The wildcard `"*"` matches on either axis independently.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(resource: &str, action: &str) -> Permission {
        Permission {
            permission_id: Uuid::new_v4(),
            resource: resource.to_string(),
            action: action.to_string(),
            name: format!("{}.{}", resource, action),
        }
    }

    #[test]
    fn test_exact_match() {
        let p = perm("users", "read");
        assert!(p.matches("users", "read"));
        assert!(!p.matches("users", "write"));
        assert!(!p.matches("orders", "read"));
    }

    #[test]
    fn test_wildcard_resource() {
        let p = perm("*", "read");
        assert!(p.matches("users", "read"));
        assert!(p.matches("orders", "read"));
        assert!(!p.matches("users", "write"));
    }

    #[test]
    fn test_wildcard_action() {
        let p = perm("users", "*");
        assert!(p.matches("users", "read"));
        assert!(p.matches("users", "delete"));
        assert!(!p.matches("orders", "read"));
    }

    #[test]
    fn test_full_wildcard_matches_anything() {
        let p = perm("*", "*");
        assert!(p.matches("users", "read"));
        assert!(p.matches("anything", "at-all"));
    }

    #[test]
    fn test_no_other_string_is_magic() {
        // "all" or "any" are plain labels, not wildcards
        let p = perm("all", "any");
        assert!(!p.matches("users", "read"));
        assert!(p.matches("all", "any"));
    }
}
