//! Service layer: the bounded worker pool that runs handler jobs.

pub mod worker_pool;

pub use worker_pool::{TaskHandle, WorkerPool};
