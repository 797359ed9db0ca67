//! Administrative reads and writes for roles, grants and user assignments.
//!
//! Shared by the `/rbac` routes and the CLI. Deletes are soft: rows get a
//! `deleted_at` (and `deleted_by` where the table has it) and disappear from
//! every read, including the authorization store.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authz::{AccessLevel, DirectGrant};
use crate::errors::{AppError, AppResult};
use crate::models::rbac::{DbRole, DbRoleGrant};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str =
    "id, name, display_name, description, is_system_role, created_at, updated_at, deleted_at, deleted_by";
const GRANT_COLUMNS: &str = "id, role_id, permission_name, is_granted, created_at, updated_at";

// =============================================================================
// ROLES
// =============================================================================

pub async fn list_roles(pool: &SqlitePool) -> AppResult<Vec<DbRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL ORDER BY name COLLATE NOCASE");
    Ok(sqlx::query_as::<_, DbRole>(&sql).fetch_all(pool).await?)
}

pub async fn find_role(pool: &SqlitePool, role_id: Uuid) -> AppResult<Option<DbRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ? AND deleted_at IS NULL");
    Ok(sqlx::query_as::<_, DbRole>(&sql)
        .bind(role_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn find_role_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<DbRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ? COLLATE NOCASE AND deleted_at IS NULL");
    Ok(sqlx::query_as::<_, DbRole>(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?)
}

pub async fn fetch_role(pool: &SqlitePool, role_id: Uuid) -> AppResult<DbRole> {
    find_role(pool, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))
}

pub async fn create_role(
    pool: &SqlitePool,
    name: &str,
    display_name: Option<&str>,
    description: Option<&str>,
    is_system_role: bool,
) -> AppResult<DbRole> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("role name must not be empty"));
    }
    if find_role_by_name(pool, name).await?.is_some() {
        return Err(AppError::conflict("role name already exists"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO roles (id, name, display_name, description, is_system_role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(display_name.unwrap_or(name))
    .bind(description)
    .bind(is_system_role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if is_system_role {
        tracing::warn!(role = %name, "created system role; holders bypass every permission check");
    }

    fetch_role(pool, id).await
}

pub async fn soft_delete_role(pool: &SqlitePool, role_id: Uuid, actor: Option<Uuid>) -> AppResult<()> {
    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE roles SET deleted_at = ?, deleted_by = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(actor)
    .bind(now)
    .bind(role_id)
    .execute(pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("role not found"));
    }
    Ok(())
}

// =============================================================================
// ROLE GRANTS
// =============================================================================

pub async fn list_role_grants(pool: &SqlitePool, role_id: Uuid) -> AppResult<Vec<DbRoleGrant>> {
    let sql = format!(
        "SELECT {GRANT_COLUMNS} FROM role_permissions WHERE role_id = ? AND deleted_at IS NULL ORDER BY permission_name"
    );
    Ok(sqlx::query_as::<_, DbRoleGrant>(&sql)
        .bind(role_id)
        .fetch_all(pool)
        .await?)
}

/// Make `(role, permission)` have exactly one active row with the given flag.
///
/// `permission` must already be canonical.
pub async fn set_grant(
    pool: &SqlitePool,
    role_id: Uuid,
    permission: &str,
    is_granted: bool,
    actor: Option<Uuid>,
) -> AppResult<DbRoleGrant> {
    let id = Uuid::new_v4();
    let now = utc_now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE role_permissions SET deleted_at = ?, deleted_by = ?, updated_at = ? WHERE role_id = ? AND permission_name = ? COLLATE NOCASE AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(actor)
    .bind(now)
    .bind(role_id)
    .bind(permission)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO role_permissions (id, role_id, permission_name, is_granted, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(role_id)
    .bind(permission)
    .bind(is_granted)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(DbRoleGrant {
        id,
        role_id,
        permission_name: permission.to_string(),
        is_granted,
        created_at: now,
        updated_at: now,
    })
}

/// Soft-delete every active row for `(role, permission)`.
pub async fn revoke_grant(
    pool: &SqlitePool,
    role_id: Uuid,
    permission: &str,
    actor: Option<Uuid>,
) -> AppResult<()> {
    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE role_permissions SET deleted_at = ?, deleted_by = ?, updated_at = ? WHERE role_id = ? AND permission_name = ? COLLATE NOCASE AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(actor)
    .bind(now)
    .bind(role_id)
    .bind(permission)
    .execute(pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("grant not found"));
    }
    Ok(())
}

// =============================================================================
// USER ASSIGNMENTS
// =============================================================================

/// Names of the active roles a user holds.
pub async fn role_names_for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT r.name
        FROM roles r
        INNER JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = ? AND r.deleted_at IS NULL
        ORDER BY r.name COLLATE NOCASE
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

pub async fn assign_role(pool: &SqlitePool, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(role_id)
        .bind(utc_now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn unassign_role(pool: &SqlitePool, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
    let affected = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("role assignment not found"));
    }
    Ok(())
}

pub async fn direct_grants_for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<DirectGrant>> {
    let rows = sqlx::query(
        "SELECT permission_name, access_level FROM user_permissions WHERE user_id = ? AND deleted_at IS NULL ORDER BY permission_name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut grants = Vec::with_capacity(rows.len());
    for row in rows {
        let permission: String = row.try_get("permission_name")?;
        let level: String = row.try_get("access_level")?;
        match AccessLevel::parse(&level) {
            Some(access_level) => grants.push(DirectGrant {
                permission,
                access_level,
            }),
            None => tracing::warn!(
                user_id = %user_id,
                permission = %permission,
                access_level = %level,
                "ignoring direct grant with unknown access level"
            ),
        }
    }
    Ok(grants)
}

/// Replace the user's active direct grant for `permission` (canonical).
pub async fn set_direct_grant(
    pool: &SqlitePool,
    user_id: Uuid,
    permission: &str,
    access_level: AccessLevel,
) -> AppResult<()> {
    let now = utc_now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE user_permissions SET deleted_at = ? WHERE user_id = ? AND permission_name = ? COLLATE NOCASE AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(user_id)
    .bind(permission)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO user_permissions (id, user_id, permission_name, access_level, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(permission)
    .bind(access_level.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
