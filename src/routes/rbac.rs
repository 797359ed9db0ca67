//! RBAC admin routes.
//!
//! Every handler passes the authorization gate first. Permission names in
//! request bodies and paths must be catalogued; they are stored in their
//! canonical spelling. Changes are logged at info with the acting user.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, catalog, operations, CurrentPrincipal, DirectGrant, Principal, ACCESS_DENIED};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::*;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(list_catalog))
        // Roles
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id", delete(delete_role))
        .route("/roles/:role_id/permissions", get(list_role_grants).put(set_role_grant))
        .route("/roles/:role_id/permissions/:permission", delete(revoke_role_grant))
        // User role assignments
        .route("/users/:user_id/roles", get(list_user_roles).post(assign_user_role))
        .route("/users/:user_id/roles/:role_id", delete(unassign_user_role))
        // User direct grants
        .route("/users/:user_id/permissions", get(list_direct_grants).put(set_direct_grant))
        // Effective permissions (computed)
        .route("/users/:user_id/effective-permissions", get(effective_permissions))
}

// =============================================================================
// CATALOG
// =============================================================================

async fn list_catalog(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<CatalogCategory>>> {
    state.gate.authorize(&principal, operations::RBAC_CATALOG).await?;
    Ok(Json(catalog::groups().iter().map(CatalogCategory::from).collect()))
}

// =============================================================================
// ROLES
// =============================================================================

async fn list_roles(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<Role>>> {
    state.gate.authorize(&principal, operations::RBAC_ROLES_LIST).await?;
    let roles = db::rbac::list_roles(&state.pool).await?;
    Ok(Json(roles.into_iter().map(Role::from).collect()))
}

async fn create_role(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    state.gate.authorize(&principal, operations::RBAC_ROLES_CREATE).await?;

    if payload.is_system_role {
        require_system_holder(&principal, &payload.name)?;
    }

    let role = db::rbac::create_role(
        &state.pool,
        &payload.name,
        payload.display_name.as_deref(),
        payload.description.as_deref(),
        payload.is_system_role,
    )
    .await?;

    tracing::info!(
        actor = ?principal.user_id,
        role_id = %role.id,
        role = %role.name,
        is_system_role = role.is_system_role,
        "role created"
    );

    Ok((StatusCode::CREATED, Json(role.into())))
}

async fn delete_role(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.gate.authorize(&principal, operations::RBAC_ROLES_DELETE).await?;
    let role = db::rbac::fetch_role(&state.pool, role_id).await?;
    if role.is_system_role {
        require_system_holder(&principal, &role.name)?;
    }

    db::rbac::soft_delete_role(&state.pool, role.id, principal.user_id).await?;
    tracing::info!(actor = ?principal.user_id, role_id = %role.id, role = %role.name, "role deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ROLE GRANTS
// =============================================================================

async fn list_role_grants(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<RoleGrant>>> {
    state.gate.authorize(&principal, operations::RBAC_GRANTS_LIST).await?;
    db::rbac::fetch_role(&state.pool, role_id).await?;
    let grants = db::rbac::list_role_grants(&state.pool, role_id).await?;
    Ok(Json(grants.into_iter().map(RoleGrant::from).collect()))
}

async fn set_role_grant(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<SetGrantRequest>,
) -> AppResult<Json<RoleGrant>> {
    state.gate.authorize(&principal, operations::RBAC_GRANTS_SET).await?;
    let permission = catalog::require_known(&payload.permission)?;
    let role = db::rbac::fetch_role(&state.pool, role_id).await?;

    let grant = db::rbac::set_grant(&state.pool, role.id, permission, payload.is_granted, principal.user_id).await?;

    tracing::info!(
        actor = ?principal.user_id,
        role = %role.name,
        permission = %permission,
        is_granted = payload.is_granted,
        "role grant set"
    );

    Ok(Json(grant.into()))
}

async fn revoke_role_grant(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((role_id, permission)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    state.gate.authorize(&principal, operations::RBAC_GRANTS_REVOKE).await?;
    let permission = catalog::require_known(&permission)?;
    let role = db::rbac::fetch_role(&state.pool, role_id).await?;

    db::rbac::revoke_grant(&state.pool, role.id, permission, principal.user_id).await?;
    tracing::info!(actor = ?principal.user_id, role = %role.name, permission = %permission, "role grant removed");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// USER ASSIGNMENTS
// =============================================================================

async fn list_user_roles(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<String>>> {
    state.gate.authorize(&principal, operations::USERS_ROLES_LIST).await?;
    db::users::fetch_by_id(&state.pool, user_id).await?;
    Ok(Json(db::rbac::role_names_for_user(&state.pool, user_id).await?))
}

async fn assign_user_role(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<StatusCode> {
    state.gate.authorize(&principal, operations::USERS_ROLES_ASSIGN).await?;
    db::users::fetch_by_id(&state.pool, user_id).await?;
    let role = db::rbac::fetch_role(&state.pool, payload.role_id).await?;

    if role.is_system_role {
        require_system_holder(&principal, &role.name)?;
    }

    db::rbac::assign_role(&state.pool, user_id, role.id).await?;
    tracing::info!(actor = ?principal.user_id, user_id = %user_id, role = %role.name, "role assigned");
    Ok(StatusCode::NO_CONTENT)
}

async fn unassign_user_role(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    state.gate.authorize(&principal, operations::USERS_ROLES_UNASSIGN).await?;
    if let Some(role) = db::rbac::find_role(&state.pool, role_id).await? {
        if role.is_system_role {
            require_system_holder(&principal, &role.name)?;
        }
    }

    db::rbac::unassign_role(&state.pool, user_id, role_id).await?;
    tracing::info!(actor = ?principal.user_id, user_id = %user_id, role_id = %role_id, "role unassigned");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_direct_grants(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<DirectGrant>>> {
    state.gate.authorize(&principal, operations::USERS_GRANTS_LIST).await?;
    db::users::fetch_by_id(&state.pool, user_id).await?;
    Ok(Json(db::rbac::direct_grants_for_user(&state.pool, user_id).await?))
}

async fn set_direct_grant(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetDirectGrantRequest>,
) -> AppResult<Json<DirectGrant>> {
    state.gate.authorize(&principal, operations::USERS_GRANTS_SET).await?;
    let permission = catalog::require_known(&payload.permission)?;
    db::users::fetch_by_id(&state.pool, user_id).await?;

    db::rbac::set_direct_grant(&state.pool, user_id, permission, payload.access_level).await?;
    tracing::info!(
        actor = ?principal.user_id,
        user_id = %user_id,
        permission = %permission,
        access_level = payload.access_level.as_str(),
        "direct grant set"
    );

    Ok(Json(DirectGrant::new(permission, payload.access_level)))
}

/// Creating, handing out, taking away or deleting a system role is reserved
/// for callers who hold one.
fn require_system_holder(principal: &Principal, role: &str) -> AppResult<()> {
    if principal.system_role == Some(true) {
        return Ok(());
    }
    tracing::warn!(user_id = ?principal.user_id, role = %role, "system role change denied");
    Err(AppError::forbidden(ACCESS_DENIED))
}

// =============================================================================
// EFFECTIVE PERMISSIONS
// =============================================================================

async fn effective_permissions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    state.gate.authorize(&principal, operations::USERS_EFFECTIVE).await?;
    db::users::fetch_by_id(&state.pool, user_id).await?;

    let subject = authz::load_principal(&state.pool, state.resolver.store(), user_id).await;
    let permissions = state
        .resolver
        .effective_permissions(&subject)
        .await
        .into_iter()
        .map(|(name, source)| EffectivePermission { name, source })
        .collect();

    Ok(Json(EffectivePermissions {
        user_id,
        roles: subject.roles,
        permissions,
    }))
}
