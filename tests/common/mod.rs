#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use rolegate::app::{router, AppState};
use rolegate::authz::DevModeConfig;
use rolegate::db;
use rolegate::jwt::JwtConfig;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
}

pub async fn test_pool() -> Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((pool, dir))
}

pub async fn spawn_app() -> Result<TestApp> {
    spawn_app_with(DevModeConfig::disabled()).await
}

pub async fn spawn_app_with(dev_mode: DevModeConfig) -> Result<TestApp> {
    let (pool, dir) = test_pool().await?;
    let state = AppState::new(pool.clone(), JwtConfig::new("test-secret", 1), dev_mode)?;
    Ok(TestApp {
        app: router(state),
        pool,
        _dir: dir,
    })
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
        // axum's extractor rejections are plain text.
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, value))
    }

    /// Register a user and return their token and id.
    pub async fn register(&self, name: &str, email: &str) -> Result<(String, Uuid)> {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "password123" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        let token = body["token"].as_str().context("missing token")?.to_string();
        let user_id = body["user"]["id"].as_str().context("missing user id")?.parse()?;
        Ok((token, user_id))
    }

    /// Make sure `role` exists and grant it `permission`.
    pub async fn grant(&self, role: &str, permission: &str) -> Result<Uuid> {
        let role_id = self.ensure_role(role, false).await?;
        db::rbac::set_grant(&self.pool, role_id, permission, true, None).await?;
        Ok(role_id)
    }

    pub async fn ensure_role(&self, role: &str, is_system_role: bool) -> Result<Uuid> {
        if let Some(existing) = db::rbac::find_role_by_name(&self.pool, role).await? {
            return Ok(existing.id);
        }
        Ok(db::rbac::create_role(&self.pool, role, None, None, is_system_role).await?.id)
    }

    pub async fn assign(&self, user_id: Uuid, role: &str) -> Result<()> {
        let role_id = self.ensure_role(role, false).await?;
        db::rbac::assign_role(&self.pool, user_id, role_id).await?;
        Ok(())
    }
}
