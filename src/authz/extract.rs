use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::principal::{assemble, Principal};
use super::store::RolePermissionStore;
use crate::app::AppState;
use crate::db;
use crate::errors::AppError;
use crate::jwt::bearer_token;

/// The principal for the current request.
///
/// Never rejects: a missing or invalid token yields an anonymous principal
/// and the authorization gate decides what that means for the route.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(CurrentPrincipal(Principal::anonymous()));
        };

        let claims = match state.jwt.decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting bearer token, continuing as anonymous");
                return Ok(CurrentPrincipal(Principal::anonymous()));
            }
        };

        let principal = load_principal(&state.pool, state.resolver.store(), claims.sub).await;
        Ok(CurrentPrincipal(principal))
    }
}

/// Load a user's identity, roles and direct grants and assemble their principal.
///
/// A user that no longer exists is anonymous. Lookup failures leave the
/// principal authenticated but without any roles or grants.
pub async fn load_principal(pool: &SqlitePool, store: &dyn RolePermissionStore, user_id: Uuid) -> Principal {
    let user = match db::users::find_by_id(pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!(user_id = %user_id, "token subject no longer exists");
            return Principal::anonymous();
        }
        Err(err) => {
            tracing::error!(user_id = %user_id, error = %err, "failed to load user for principal");
            return Principal::new(user_id).with_system_role(false);
        }
    };

    let roles = db::rbac::role_names_for_user(pool, user_id)
        .await
        .unwrap_or_else(|err| {
            tracing::error!(user_id = %user_id, error = %err, "failed to load user roles");
            Vec::new()
        });

    let direct_grants = db::rbac::direct_grants_for_user(pool, user_id)
        .await
        .unwrap_or_else(|err| {
            tracing::error!(user_id = %user_id, error = %err, "failed to load direct grants");
            Vec::new()
        });

    assemble(store, user_id, Some(user.email), roles, direct_grants).await
}
