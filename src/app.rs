use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{default_operations, AuthorizationGate, DevModeConfig, PermissionResolver};
use crate::db::SqliteRolePermissionStore;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, projects, rbac};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub resolver: Arc<PermissionResolver>,
    pub gate: AuthorizationGate,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, dev_mode: DevModeConfig) -> Result<Self, AppError> {
        let store = Arc::new(SqliteRolePermissionStore::new(pool.clone()));
        let resolver = Arc::new(PermissionResolver::new(store).with_dev_mode(dev_mode));
        let gate = AuthorizationGate::new(resolver.clone(), default_operations()?);

        Ok(Self {
            pool,
            jwt: Arc::new(jwt),
            resolver,
            gate,
        })
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, DevModeConfig::from_env())?;
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects))
        .route("/", post(projects::create_project))
        .route("/:id", get(projects::get_project))
        .route("/:id", put(projects::update_project))
        .route("/:id", delete(projects::delete_project));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/rbac", rbac::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
