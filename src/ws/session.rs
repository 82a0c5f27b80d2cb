//! Per-connection receive loop.
//!
//! A session reads frames, decodes each into an [`Envelope`], resolves its
//! handler, and submits the job to the [`WorkerPool`]. It never waits for a
//! job before reading the next frame: each request gets its own delivery
//! task in the session's [`JoinSet`], so responses on one connection can
//! arrive out of order.
//!
//! Bad frames (malformed JSON, unknown action) are logged and dropped; the
//! connection stays open.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::sender::{ResponseSender, write_loop};
use crate::app_state::AppState;
use crate::config::DisconnectPolicy;
use crate::domain::{Action, ActionRegistry, Envelope};
use crate::error::GatewayError;
use crate::service::{TaskHandle, WorkerPool};

/// Everything a session needs from the server.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Handlers by action.
    pub registry: Arc<ActionRegistry>,
    /// Shared worker pool.
    pub pool: WorkerPool,
    /// What to do with outstanding requests when the client goes away.
    pub disconnect_policy: DisconnectPolicy,
    /// Whether handler failures are reported to the client.
    pub report_handler_errors: bool,
    /// Fires when the server starts draining.
    pub shutdown: CancellationToken,
}

impl From<&AppState> for SessionContext {
    fn from(state: &AppState) -> Self {
        Self {
            registry: Arc::clone(&state.registry),
            pool: state.pool.clone(),
            disconnect_policy: state.disconnect_policy,
            report_handler_errors: state.report_handler_errors,
            shutdown: state.shutdown.clone(),
        }
    }
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    ClientClosed,
    TransportError,
    Shutdown,
}

/// Decodes one text frame and submits its handler to the pool.
///
/// Returns as soon as the job is queued.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] or [`GatewayError::UnknownAction`] for
/// a bad frame and [`GatewayError::ExecutorStopped`] once the pool is
/// drained.
pub fn dispatch(
    text: &str,
    registry: &ActionRegistry,
    pool: &WorkerPool,
) -> Result<(Action, TaskHandle<Value>), GatewayError> {
    let request = Envelope::decode(text)?;
    let handler = registry.resolve(request.action)?;
    let content = request.content;
    let handle = pool.submit(move || handler.handle(content))?;
    Ok((request.action, handle))
}

/// Runs a session until the client disconnects, the transport fails, or
/// the server shuts down.
pub async fn run_session(socket: WebSocket, peer: SocketAddr, ctx: SessionContext) {
    let connection_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("session", %connection_id, %peer);
    Session::new(ctx).run(socket).instrument(span).await;
}

struct Session {
    ctx: SessionContext,
    in_flight: JoinSet<()>,
    jobs: Vec<AbortHandle>,
}

impl Session {
    fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            in_flight: JoinSet::new(),
            jobs: Vec::new(),
        }
    }

    async fn run(mut self, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let (sender, rx) = ResponseSender::channel();
        let writer = tokio::spawn(write_loop(sink, rx).in_current_span());
        tracing::info!("connection opened");

        let shutdown = self.ctx.shutdown.clone();
        let end = loop {
            tokio::select! {
                () = shutdown.cancelled() => break SessionEnd::Shutdown,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(err) = joined
                        && err.is_panic()
                    {
                        tracing::error!(error = %err, "response task panicked");
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.accept(text.as_str(), &sender),
                    Some(Ok(Message::Binary(_))) => tracing::debug!("ignoring binary frame"),
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::ClientClosed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "transport error");
                        break SessionEnd::TransportError;
                    }
                },
            }
        };

        match end {
            SessionEnd::Shutdown => {
                tracing::info!(
                    outstanding = self.in_flight.len(),
                    "server shutting down; finishing outstanding requests"
                );
                while self.in_flight.join_next().await.is_some() {}
                sender.send_frame(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                })));
                drop(sender);
                if let Err(err) = writer.await {
                    tracing::debug!(error = %err, "writer task ended abnormally");
                }
            }
            SessionEnd::ClientClosed => {
                tracing::info!(outstanding = self.in_flight.len(), "connection closed");
                self.release_in_flight();
                sender.send_frame(Message::Close(None));
                drop(sender);
                if let Err(err) = writer.await {
                    tracing::debug!(error = %err, "writer task ended abnormally");
                }
            }
            SessionEnd::TransportError => {
                self.release_in_flight();
                writer.abort();
            }
        }
    }

    /// Dispatches one text frame. Failures are logged and the frame dropped.
    fn accept(&mut self, text: &str, sender: &ResponseSender) {
        match dispatch(text, &self.ctx.registry, &self.ctx.pool) {
            Ok((action, handle)) => {
                tracing::debug!(%action, "request dispatched");
                self.jobs.retain(|job| !job.is_finished());
                self.jobs.push(handle.abort_handle());
                let delivery = deliver(
                    action,
                    handle,
                    sender.clone(),
                    self.ctx.report_handler_errors,
                );
                self.in_flight.spawn(delivery.in_current_span());
            }
            Err(err) => tracing::warn!(error = %err, "dropping request"),
        }
    }

    /// Applies the disconnect policy to outstanding requests.
    fn release_in_flight(&mut self) {
        match self.ctx.disconnect_policy {
            DisconnectPolicy::Detach => self.in_flight.detach_all(),
            DisconnectPolicy::Abort => {
                for job in self.jobs.drain(..) {
                    job.abort();
                }
                self.in_flight.abort_all();
            }
        }
    }
}

/// Awaits one job and hands its result to the sender.
async fn deliver(
    action: Action,
    handle: TaskHandle<Value>,
    sender: ResponseSender,
    report_errors: bool,
) {
    match handle.await {
        Ok(content) => {
            sender.send(&Envelope::new(action, content));
        }
        Err(err) => {
            tracing::warn!(%action, error = %err, "handler failed");
            if report_errors {
                sender.send_error(action, &err);
            }
        }
    }
}
