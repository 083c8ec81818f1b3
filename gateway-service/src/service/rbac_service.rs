//! # RBAC Service
//!
//! Effective-permission resolution for `(user, application?)`.
//!
//! The scoping rule: a user's effective roles in a scope are the union of
//! their **global** grants (`application_id IS NULL`) and their grants for
//! that application. Permission checks walk the union's permissions; the
//! `"*"` wildcard on resource or action matches anything, and nothing else
//! is magic.

use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{Permission, Role};
use crate::repository::RbacRepository;

/// Role and permission resolution.
#[derive(Debug, Clone)]
pub struct RbacService {
    repository: RbacRepository,
}

impl RbacService {
    /// Creates the service over the repository.
    pub fn new(repository: RbacRepository) -> Self {
        Self { repository }
    }

    /// Effective roles of a user in a scope.
    pub async fn get_user_roles(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<Vec<Role>, ApiError> {
        self.repository.roles_for_user(user_id, application_id).await
    }

    /// Effective role **names**, for token claims.
    pub async fn get_user_role_names(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<Vec<String>, ApiError> {
        let roles = self.get_user_roles(user_id, application_id).await?;
        Ok(roles.into_iter().map(|r| r.name).collect())
    }

    /// Effective permissions of a user in a scope.
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<Vec<Permission>, ApiError> {
        self.repository
            .permissions_for_user(user_id, application_id)
            .await
    }

    /// Whether some role in the user's effective set grants
    /// `(resource, action)`.
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        resource: &str,
        action: &str,
        application_id: Option<Uuid>,
    ) -> Result<bool, ApiError> {
        let permissions = self.get_user_permissions(user_id, application_id).await?;
        Ok(check_permission_set(&permissions, resource, action))
    }

    /// Grants a role by name within a scope.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_name: &str,
        application_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let role = self
            .repository
            .find_role_by_name(role_name, application_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("role:{}", role_name),
            })?;

        self.repository
            .assign_role(user_id, role.role_id, application_id)
            .await
    }
}

/// Pure permission-set check, factored out for testability.
pub fn check_permission_set(permissions: &[Permission], resource: &str, action: &str) -> bool {
    permissions.iter().any(|p| p.matches(resource, action))
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
    fn test_permission_set_union_semantics() {
        let perms = vec![perm("users", "read"), perm("sessions", "revoke")];

        assert!(check_permission_set(&perms, "users", "read"));
        assert!(check_permission_set(&perms, "sessions", "revoke"));
        assert!(!check_permission_set(&perms, "users", "delete"));
        assert!(!check_permission_set(&perms, "applications", "read"));
    }

    #[test]
    fn test_admin_wildcard_wins_over_specifics() {
        let perms = vec![perm("users", "read"), perm("*", "*")];
        assert!(check_permission_set(&perms, "absolutely", "anything"));
    }

    #[test]
    fn test_empty_set_denies() {
        assert!(!check_permission_set(&[], "users", "read"));
    }
}
