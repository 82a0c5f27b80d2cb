//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::DisconnectPolicy;
use crate::domain::ActionRegistry;
use crate::server::LifecycleState;
use crate::service::WorkerPool;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handlers by action; read-only after startup.
    pub registry: Arc<ActionRegistry>,
    /// Worker pool shared by every session.
    pub pool: WorkerPool,
    /// Tracks running sessions so shutdown can wait for them.
    pub sessions: TaskTracker,
    /// Cancelled when the server starts draining.
    pub shutdown: CancellationToken,
    /// Current lifecycle state, for the health endpoint.
    pub lifecycle: watch::Receiver<LifecycleState>,
    /// Behaviour for outstanding requests when a client disconnects.
    pub disconnect_policy: DisconnectPolicy,
    /// Whether handler failures are reported to clients.
    pub report_handler_errors: bool,
}
