//! Output module for scheduler reports
//!
//! Loads queue, ledger and worker statistics and prints them to the console.

pub mod stats;

pub use stats::{load_statistics, print_pool_statistics, print_statistics, SchedulerStatistics};
