//! Response delivery back to the originating connection.
//!
//! A [`ResponseSender`] feeds a per-connection writer task through an
//! unbounded channel. Once the writer is gone (the socket closed or
//! failed), sends become silent no-ops: a result that lands after its
//! connection closed is expected, not a fault.

use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::sync::mpsc;

use crate::domain::{Action, Envelope, ErrorEnvelope};
use crate::error::HandlerError;

/// Writes frames onto one connection.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl ResponseSender {
    /// Creates a sender and the receiving end the writer task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sends a response envelope.
    ///
    /// Returns `false` if the frame was dropped because the connection is
    /// gone or the envelope could not be encoded.
    pub fn send(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.send_frame(Message::text(text)),
            Err(err) => {
                tracing::warn!(action = %envelope.action, error = %err, "failed to encode response");
                false
            }
        }
    }

    /// Sends an error envelope for a failed handler.
    pub fn send_error(&self, action: Action, err: &HandlerError) -> bool {
        match ErrorEnvelope::from_handler_error(action, err).encode() {
            Ok(text) => self.send_frame(Message::text(text)),
            Err(encode_err) => {
                tracing::warn!(%action, error = %encode_err, "failed to encode error envelope");
                false
            }
        }
    }

    /// Queues a raw frame for the writer.
    pub fn send_frame(&self, frame: Message) -> bool {
        let delivered = self.tx.send(frame).is_ok();
        if !delivered {
            tracing::debug!("connection closed before response was ready; dropping it");
        }
        delivered
    }
}

/// Drains queued frames onto the socket until every sender is dropped or a
/// write fails.
pub async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(frame) = rx.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if let Err(err) = sink.send(frame).await {
            tracing::debug!(error = %err, "socket write failed; writer stopping");
            break;
        }
        if closing {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn send_queues_encoded_envelope() {
        let (sender, mut rx) = ResponseSender::channel();
        let envelope = Envelope::new(Action::ComputeLayout, json!([[0.0, 1.0]]));
        assert!(sender.send(&envelope));

        let Some(Message::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        assert_eq!(text.as_str(), r#"{"action":1,"content":[[0.0,1.0]]}"#);
    }

    #[test]
    fn send_after_close_is_silent_noop() {
        let (sender, rx) = ResponseSender::channel();
        drop(rx);
        assert!(!sender.send(&Envelope::new(Action::LoadData, json!("[]"))));
        assert!(!sender.send_error(Action::LoadData, &HandlerError::Cancelled));
    }

    #[tokio::test]
    async fn send_error_uses_error_envelope() {
        let (sender, mut rx) = ResponseSender::channel();
        assert!(sender.send_error(
            Action::ComputeLayout,
            &HandlerError::InvalidGraph("link references undeclared node 9".to_string()),
        ));
        let Some(Message::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            panic!("not json");
        };
        assert_eq!(value["action"], json!(1));
        assert_eq!(value["error"]["kind"], json!("invalid_graph"));
    }
}
