//! System endpoints: health check and action catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::server::LifecycleState;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    state: LifecycleState,
    timestamp: String,
    version: String,
    workers: WorkerStats,
}

/// Worker pool occupancy.
#[derive(Debug, Serialize)]
struct WorkerStats {
    max: usize,
    busy: usize,
}

/// `GET /health` — Service health status.
///
/// Reports `healthy` while listening and `draining` once shutdown starts.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let lifecycle = *state.lifecycle.borrow();
    let status = match lifecycle {
        LifecycleState::Starting | LifecycleState::Listening => "healthy",
        LifecycleState::Draining | LifecycleState::Stopped => "draining",
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status,
            state: lifecycle,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            workers: WorkerStats {
                max: state.pool.max_workers(),
                busy: state.pool.busy_workers(),
            },
        }),
    )
}

/// Registered action info.
#[derive(Debug, Serialize)]
struct ActionInfo {
    code: i64,
    name: &'static str,
}

/// `GET /config/actions` — List registered actions and their wire codes.
pub async fn actions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let actions: Vec<ActionInfo> = state
        .registry
        .actions()
        .map(|action| ActionInfo {
            code: action.code(),
            name: action.name(),
        })
        .collect();
    (StatusCode::OK, Json(actions))
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/actions", get(actions_handler))
}
