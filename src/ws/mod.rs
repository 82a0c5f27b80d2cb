//! WebSocket layer: upgrade handling, per-connection sessions, and
//! response delivery.
//!
//! Each connection runs a [`session`] that reads request envelopes and a
//! writer task fed by a [`sender::ResponseSender`].

pub mod handler;
pub mod sender;
pub mod session;
