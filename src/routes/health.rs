use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// Present (and true) only while the development override is live.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dev_override: bool,
}

pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_check = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let dev_override = state.resolver.dev_mode().is_active();

    Ok(Json(match db_check {
        Ok(_) => HealthResponse { status: "ok", db_ok: true, db_error: None, dev_override },
        Err(e) => HealthResponse { status: "ok", db_ok: false, db_error: Some(e.to_string()), dev_override },
    }))
}
