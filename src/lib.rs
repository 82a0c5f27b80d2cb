//! # dataviz-gateway
//!
//! WebSocket compute gateway for browser visualisations.
//!
//! Clients send small JSON envelopes (`{"action": <int>, "content": ...}`)
//! over a persistent WebSocket. Each request is dispatched to a handler
//! that runs on a bounded worker pool, off the I/O loop, and the result is
//! streamed back on the same connection as soon as it is ready. Responses
//! on one connection may arrive out of order.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── Server lifecycle (server)
//!     ├── Session + ResponseSender (ws/)
//!     │
//!     ├── ActionRegistry + Envelope (domain/)
//!     ├── WorkerPool (service/)
//!     │
//!     └── Handlers: CSV loader, spring layout (compute/)
//! ```

pub mod api;
pub mod app_state;
pub mod compute;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod ws;
