//! Closed set of actions the gateway exposes.
//!
//! [`Action`] carries an explicit integer wire code. The mapping between
//! variant and code is a pure function in both directions; serde goes
//! through the same mapping so the wire value can never drift.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An operation a client can request over the WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Action {
    /// Load a tabular file from the data directory. Wire code `0`.
    LoadData,
    /// Compute a force-directed layout for a graph. Wire code `1`.
    ComputeLayout,
}

impl Action {
    /// Every action, in wire-code order.
    pub const ALL: [Self; 2] = [Self::LoadData, Self::ComputeLayout];

    /// Returns the integer used for this action on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::LoadData => 0,
            Self::ComputeLayout => 1,
        }
    }

    /// Maps a wire code back to an action, or `None` if the code is unknown.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::LoadData),
            1 => Some(Self::ComputeLayout),
            _ => None,
        }
    }

    /// Human-readable name used in logs and the `/config/actions` listing.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LoadData => "load_data",
            Self::ComputeLayout => "compute_layout",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Action> for i64 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

/// Error returned when converting an unknown wire code into an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown action code {0}")]
pub struct UnknownActionCode(pub i64);

impl TryFrom<i64> for Action {
    type Error = UnknownActionCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(UnknownActionCode(code))
    }
}
