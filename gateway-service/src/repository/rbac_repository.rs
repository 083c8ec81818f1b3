//! # RBAC Repository
//!
//! Role and permission resolution queries.
//!
//! The scoping rule lives in the SQL: a grant row's `application_id` is
//! either `NULL` (global) or a tenant id, and every resolution query takes
//! the union `application_id IS NULL OR application_id = $app`.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Permission, Role};

/// Repository for role/permission resolution.
#[derive(Debug, Clone)]
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Effective roles of a user in a scope: global grants plus grants for
    /// the requested application.
    pub async fn roles_for_user(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<Vec<Role>, ApiError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT DISTINCT r.*
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.role_id
            WHERE ur.user_id = $1
              AND (ur.application_id IS NULL OR ur.application_id = $2)
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    /// Effective permissions of a user in a scope, through the role union.
    pub async fn permissions_for_user(
        &self,
        user_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<Vec<Permission>, ApiError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT DISTINCT p.*
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.permission_id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
              AND (ur.application_id IS NULL OR ur.application_id = $2)
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    /// Finds a role by name within a scope (NULL = global role).
    pub async fn find_role_by_name(
        &self,
        name: &str,
        application_id: Option<Uuid>,
    ) -> Result<Option<Role>, ApiError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT * FROM roles
            WHERE name = $1 AND application_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(name)
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    /// Grants a role to a user, optionally scoped to one application.
    ///
    /// Idempotent: re-granting an existing assignment is a no-op.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, application_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(application_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a role grant.
    pub async fn revoke_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        application_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            DELETE FROM user_roles
            WHERE user_id = $1 AND role_id = $2
              AND application_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(application_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
