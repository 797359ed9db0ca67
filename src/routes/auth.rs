use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::CurrentPrincipal;
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::EffectivePermission;
use crate::models::user::{AuthResponse, LoginRequest, MeResponse, RegisterRequest, User};
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let email = normalize_email(&payload.email)?;
    if db::users::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::conflict("email already in use"));
    }

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    tracing::info!(user_id = %user_id, "user registered");

    let user: User = db::users::fetch_by_id(&state.pool, user_id).await?.into();
    let token = state.jwt.encode(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = payload.email.trim();
    let db_user = db::users::find_by_email(&state.pool, email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: db_user.into(),
    }))
}

/// The caller's profile, roles and every catalogued permission they hold.
pub async fn me(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<MeResponse>> {
    let user_id = principal
        .user_id
        .filter(|_| principal.authenticated)
        .ok_or_else(|| AppError::unauthorized("authentication required"))?;

    let user: User = db::users::fetch_by_id(&state.pool, user_id).await?.into();
    let permissions = state
        .resolver
        .effective_permissions(&principal)
        .await
        .into_iter()
        .map(|(name, source)| EffectivePermission { name, source })
        .collect();

    Ok(Json(MeResponse {
        user,
        roles: principal.roles,
        permissions,
    }))
}

pub async fn logout(CurrentPrincipal(principal): CurrentPrincipal) -> AppResult<Json<MessageResponse>> {
    if !principal.authenticated {
        return Err(AppError::unauthorized("authentication required"));
    }
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}
