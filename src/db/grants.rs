use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::authz::{RolePermissionStore, StoreError};

/// `RolePermissionStore` over the `roles` and `role_permissions` tables.
///
/// Soft-deleted roles and grant rows are never visible. Names compare with
/// `COLLATE NOCASE` (ASCII case folding).
#[derive(Debug, Clone)]
pub struct SqliteRolePermissionStore {
    pool: SqlitePool,
}

impl SqliteRolePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RolePermissionStore for SqliteRolePermissionStore {
    async fn check_granted(&self, role: &str, permission: &str) -> Result<bool, StoreError> {
        // Duplicate active rows may exist; any granted one wins.
        let granted: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM role_permissions rp
                INNER JOIN roles r ON r.id = rp.role_id
                WHERE r.name = ? COLLATE NOCASE
                  AND r.deleted_at IS NULL
                  AND rp.permission_name = ? COLLATE NOCASE
                  AND rp.is_granted = 1
                  AND rp.deleted_at IS NULL
            )
            "#,
        )
        .bind(role)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;

        Ok(granted != 0)
    }

    async fn granted_permissions(&self, role: &str) -> Result<HashSet<String>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT rp.permission_name
            FROM role_permissions rp
            INNER JOIN roles r ON r.id = rp.role_id
            WHERE r.name = ? COLLATE NOCASE
              AND r.deleted_at IS NULL
              AND rp.is_granted = 1
              AND rp.deleted_at IS NULL
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(|name| name.to_ascii_lowercase()).collect())
    }

    async fn is_system_role(&self, role: &str) -> Result<bool, StoreError> {
        let system: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM roles WHERE name = ? COLLATE NOCASE AND deleted_at IS NULL AND is_system_role = 1)",
        )
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(system != 0)
    }
}
