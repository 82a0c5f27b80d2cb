//! Built-in action handlers.
//!
//! Both run synchronously on a worker thread and only see the request
//! content, never the connection.

pub mod layout;
pub mod tabular;

pub use layout::{LayoutRequest, NodeId, SpringLayout};
pub use tabular::{LoadDataRequest, TabularLoader};
