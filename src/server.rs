//! Server lifecycle: bind, serve, drain, stop.
//!
//! ```text
//! Starting ──bind──▶ Listening ──shutdown()──▶ Draining ──▶ Stopped
//! ```
//!
//! Draining stops the accept loop, tells every session to finish, drains
//! the worker pool, and waits for all session tasks. The trigger is a
//! [`ShutdownHandle`]; the binary wires it to Ctrl-C (and SIGTERM on Unix)
//! through [`shutdown_signal`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::domain::ActionRegistry;
use crate::error::GatewayError;
use crate::service::WorkerPool;
use crate::ws::handler::ws_handler;

/// Lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Worker pool built, listener bound, not yet serving.
    Starting,
    /// Accepting connections.
    Listening,
    /// Shutdown requested; finishing outstanding work.
    Draining,
    /// Everything released.
    Stopped,
}

/// Triggers a graceful shutdown. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Requests shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A bound gateway, ready to [`run`](Server::run).
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: AppState,
    lifecycle: Arc<watch::Sender<LifecycleState>>,
}

impl Server {
    /// Builds the default handlers and binds the listener.
    ///
    /// # Errors
    ///
    /// See [`Server::bind_with_registry`].
    pub async fn bind(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let registry = ActionRegistry::with_defaults(config.data_dir.clone());
        Self::bind_with_registry(config, registry).await
    }

    /// Builds the worker pool and binds the listener, serving `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `max_workers` is zero and
    /// [`GatewayError::Io`] if the address cannot be bound.
    pub async fn bind_with_registry(
        config: &GatewayConfig,
        registry: ActionRegistry,
    ) -> Result<Self, GatewayError> {
        let (lifecycle, lifecycle_rx) = watch::channel(LifecycleState::Starting);
        let pool = WorkerPool::new(config.max_workers)?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            max_workers = config.max_workers,
            data_dir = %config.data_dir.display(),
            "gateway bound"
        );

        let state = AppState {
            registry: Arc::new(registry),
            pool,
            sessions: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            lifecycle: lifecycle_rx,
            disconnect_policy: config.disconnect_policy,
            report_handler_errors: config.report_handler_errors,
        };

        Ok(Self {
            listener,
            local_addr,
            state,
            lifecycle: Arc::new(lifecycle),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops this server.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.state.shutdown.clone(),
        }
    }

    /// Watches lifecycle transitions.
    #[must_use]
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Serves until shutdown is requested, then drains and stops.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Io`] if serving fails. The pool and the
    /// sessions are drained either way.
    pub async fn run(self) -> Result<(), GatewayError> {
        let Self {
            listener,
            local_addr,
            state,
            lifecycle,
        } = self;

        let app = router(state.clone());
        lifecycle.send_replace(LifecycleState::Listening);
        tracing::info!(addr = %local_addr, "server listening");

        let token = state.shutdown.clone();
        let draining = Arc::clone(&lifecycle);
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            token.cancelled().await;
            draining.send_replace(LifecycleState::Draining);
            tracing::info!("shutdown requested; no longer accepting connections");
        })
        .await;

        if let Err(err) = &served {
            tracing::error!(error = %err, "server failed; draining");
        }
        state.shutdown.cancel();
        lifecycle.send_replace(LifecycleState::Draining);

        state.pool.drain_and_stop().await;
        state.sessions.close();
        tracing::info!(sessions = state.sessions.len(), "waiting for sessions to close");
        state.sessions.wait().await;

        lifecycle.send_replace(LifecycleState::Stopped);
        tracing::info!("server stopped");
        served.map_err(GatewayError::from)
    }
}

/// Builds the full router: REST endpoints plus the WebSocket upgrade on
/// `/` and `/ws`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
