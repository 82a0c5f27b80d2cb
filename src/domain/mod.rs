//! Domain layer: actions, wire envelopes, and the action registry.

pub mod action;
pub mod action_registry;
pub mod envelope;

pub use action::Action;
pub use action_registry::{ActionHandler, ActionRegistry};
pub use envelope::{Envelope, ErrorDetail, ErrorEnvelope};
