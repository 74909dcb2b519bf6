//! Configuration module for crawl-queue
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_queue::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl-queue.toml")).unwrap();
//! println!("Starting {} workers", config.workers.count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DispatcherConfig, HttpConfig, SeedEntry, StorageConfig, TelemetryConfig,
    WorkersConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, MAX_WORKERS};
