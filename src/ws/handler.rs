//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use tokio_util::task::task_tracker::TaskTrackerToken;

use super::session::{SessionContext, run_session};
use crate::app_state::AppState;
use crate::error::GatewayError;

/// `GET /` and `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`GatewayError::ShuttingDown`] (503) once the server is draining.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let reservation = reserve_session(&state)?;
    let ctx = SessionContext::from(&state);

    Ok(ws.on_upgrade(move |socket| async move {
        run_session(socket, peer, ctx).await;
        drop(reservation);
    }))
}

/// Counts the session as live from the moment the upgrade is accepted.
///
/// The token is held until the session ends (or the upgrade fails), so
/// [`TaskTracker::wait`](tokio_util::task::TaskTracker::wait) cannot return
/// while an upgrade is still completing.
fn reserve_session(state: &AppState) -> Result<TaskTrackerToken, GatewayError> {
    if state.shutdown.is_cancelled() {
        return Err(GatewayError::ShuttingDown);
    }
    Ok(state.sessions.token())
}
