//! Static mapping from [`Action`] to the handler that implements it.
//!
//! The registry is built once at startup and shared read-only by every
//! session, so it needs no locking. Adding an action is a single
//! [`ActionRegistry::register`] call; the dispatch loop never changes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use super::Action;
use crate::compute::{SpringLayout, TabularLoader};
use crate::error::{GatewayError, HandlerError};

/// Synchronous handler for one action.
///
/// Implementations may block on disk or burn CPU; they always run on a
/// worker thread and never see connection state.
pub trait ActionHandler: Send + Sync + 'static {
    /// Turns a request payload into a response payload.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] describing why the request could not be
    /// served.
    fn handle(&self, content: Value) -> Result<Value, HandlerError>;
}

impl<F> ActionHandler for F
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, content: Value) -> Result<Value, HandlerError> {
        self(content)
    }
}

/// Lookup table from action to handler.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<Action, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in handlers: CSV loading from
    /// `data_dir` and spring layout.
    #[must_use]
    pub fn with_defaults(data_dir: impl Into<PathBuf>) -> Self {
        Self::new()
            .register(Action::LoadData, TabularLoader::new(data_dir))
            .register(Action::ComputeLayout, SpringLayout::default())
    }

    /// Registers `handler` for `action`, replacing any previous handler.
    #[must_use]
    pub fn register(mut self, action: Action, handler: impl ActionHandler) -> Self {
        self.handlers.insert(action, Arc::new(handler));
        self
    }

    /// Returns the handler registered for `action`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownAction`] if no handler is registered.
    pub fn resolve(&self, action: Action) -> Result<Arc<dyn ActionHandler>, GatewayError> {
        self.handlers
            .get(&action)
            .map(Arc::clone)
            .ok_or(GatewayError::UnknownAction(action.code()))
    }

    /// Registered actions in wire-code order.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.handlers.keys().copied()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
