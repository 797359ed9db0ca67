use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::DbUser;

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at, deleted_at";

pub async fn find_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE AND deleted_at IS NULL");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn fetch_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    find_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
