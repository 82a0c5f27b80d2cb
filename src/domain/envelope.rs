//! Wire envelopes exchanged over the WebSocket.
//!
//! Requests and responses share one shape:
//!
//! ```json
//! { "action": 0, "content": { "name": "mtcars.csv" } }
//! ```
//!
//! Decoding happens in two steps so that a well-formed envelope with an
//! unrecognised action code surfaces as [`GatewayError::UnknownAction`]
//! rather than a generic decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Action;
use crate::error::{GatewayError, HandlerError};

/// Action tag plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Which operation this envelope belongs to.
    pub action: Action,
    /// Action-specific payload.
    pub content: Value,
}

/// Envelope with the action still in raw wire form.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    action: i64,
    #[serde(default)]
    content: Value,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(action: Action, content: Value) -> Self {
        Self { action, content }
    }

    /// Decodes a text frame into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Decode`] if the text is not a JSON object
    /// with an integer `action`, or [`GatewayError::UnknownAction`] if the
    /// action code is not one of [`Action::ALL`].
    pub fn decode(text: &str) -> Result<Self, GatewayError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let action = Action::from_code(raw.action).ok_or(GatewayError::UnknownAction(raw.action))?;
        Ok(Self {
            action,
            content: raw.content,
        })
    }

    /// Encodes the envelope as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(GatewayError::Encode)
    }
}

/// Envelope reporting a failed handler back to the client.
///
/// Only sent when the operator enables handler error reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Action of the request that failed.
    pub action: Action,
    /// What went wrong.
    pub error: ErrorDetail,
}

/// Body of an [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable error kind (see [`HandlerError::kind`]).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorEnvelope {
    /// Builds an error envelope from a handler failure.
    #[must_use]
    pub fn from_handler_error(action: Action, err: &HandlerError) -> Self {
        Self {
            action,
            error: ErrorDetail {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Encodes the envelope as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(GatewayError::Encode)
    }
}
