use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{operations, CurrentPrincipal, Principal};
use crate::errors::{AppError, AppResult};
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::utils::utc_now;

const PROJECT_COLUMNS: &str = "id, name, description, created_by, created_at, updated_at, deleted_at";

pub async fn list_projects(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<Project>>> {
    state.gate.authorize(&principal, operations::PROJECTS_LIST).await?;

    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted_at IS NULL ORDER BY created_at DESC");
    let projects = sqlx::query_as::<_, DbProject>(&sql)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(projects.into_iter().map(Project::from).collect()))
}

pub async fn create_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    state.gate.authorize(&principal, operations::PROJECTS_CREATE).await?;
    let created_by = actor(&principal)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("project name must not be empty"));
    }

    let now = utc_now();
    let project_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO projects (id, name, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(name)
    .bind(&payload.description)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let project = fetch_project(&state.pool, project_id).await?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    state.gate.authorize(&principal, operations::PROJECTS_GET).await?;
    let project = fetch_project(&state.pool, id).await?;
    Ok(Json(project.into()))
}

pub async fn update_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    state.gate.authorize(&principal, operations::PROJECTS_UPDATE).await?;
    let mut project = fetch_project(&state.pool, id).await?;

    if let Some(name) = payload.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::bad_request("project name must not be empty"));
        }
        project.name = name.to_string();
    }
    if payload.description.is_some() {
        project.description = payload.description;
    }

    let now = utc_now();

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(&project.name)
        .bind(&project.description)
        .bind(now)
        .bind(project.id)
        .execute(&state.pool)
        .await?;

    project.updated_at = now;
    Ok(Json(project.into()))
}

pub async fn delete_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.gate.authorize(&principal, operations::PROJECTS_DELETE).await?;

    let now = utc_now();
    let affected = sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("project not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// The acting user's id; only reachable after the gate allowed the request.
fn actor(principal: &Principal) -> AppResult<Uuid> {
    principal
        .user_id
        .ok_or_else(|| AppError::unauthorized("authentication required"))
}

async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<DbProject> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ? AND deleted_at IS NULL");
    sqlx::query_as::<_, DbProject>(&sql)
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))
}
