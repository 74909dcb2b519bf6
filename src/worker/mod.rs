//! Worker pool and per-worker state
//!
//! Each worker repeatedly claims one entry from the dispatcher, runs the
//! page processor on it under a timeout, reports the outcome and pauses.

mod pool;
mod runner;
mod state;

pub use pool::WorkerPool;
pub use state::{PoolStats, WorkerState, WorkerStats};
