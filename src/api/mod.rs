//! HTTP API layer: operational endpoints served next to the WebSocket.

pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the HTTP router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(handlers::system::routes())
}
