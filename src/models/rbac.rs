use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::authz::{AccessLevel, DecisionRule, PermissionGroup};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl From<DbRole> for Role {
    fn from(db: DbRole) -> Self {
        Role {
            id: db.id,
            name: db.name,
            display_name: db.display_name,
            description: db.description,
            is_system_role: db.is_system_role,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleCreateRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_role: bool,
}

// =============================================================================
// ROLE-PERMISSION GRANT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission: String,
    pub is_granted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRoleGrant {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission_name: String,
    pub is_granted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbRoleGrant> for RoleGrant {
    fn from(db: DbRoleGrant) -> Self {
        RoleGrant {
            id: db.id,
            role_id: db.role_id,
            permission: db.permission_name,
            is_granted: db.is_granted,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Sets the authoritative grant row for a permission; `is_granted = false`
/// records an explicit revocation.
#[derive(Debug, Deserialize)]
pub struct SetGrantRequest {
    pub permission: String,
    #[serde(default = "default_true")]
    pub is_granted: bool,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// USER ASSIGNMENTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SetDirectGrantRequest {
    pub permission: String,
    pub access_level: AccessLevel,
}

// =============================================================================
// CATALOG AND EFFECTIVE PERMISSIONS (computed)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CatalogCategory {
    pub category: &'static str,
    pub description: &'static str,
    pub permissions: &'static [&'static str],
}

impl From<&PermissionGroup> for CatalogCategory {
    fn from(group: &PermissionGroup) -> Self {
        CatalogCategory {
            category: group.category,
            description: group.description,
            permissions: group.permissions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<EffectivePermission>,
}

#[derive(Debug, Serialize)]
pub struct EffectivePermission {
    pub name: &'static str,
    /// Which rule granted it (`role_grant`, `implied_grant`, `direct_grant`, ...)
    #[serde(flatten)]
    pub source: DecisionRule,
}
