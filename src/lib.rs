//! crawl-queue: a durable crawl scheduler
//!
//! This crate decides which URL gets fetched next and by whom. It keeps a
//! priority-ordered work queue and a visit ledger in SQLite, enforces a
//! revisit cooldown, hands work to a pool of workers through an atomic
//! claim protocol, and collects per-step timing telemetry for each worker.

pub mod config;
pub mod dispatcher;
pub mod ledger;
pub mod output;
pub mod processor;
pub mod queue;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL not admitted: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: state::EntryState,
        to: state::EntryState,
    },

    #[error("No queue entry for {0}")]
    EntryNotFound(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a submission was refused before it reached the queue
///
/// Both variants fail closed: the URL is not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("malformed URL: {0}")]
    MalformedUrl(#[from] UrlError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{CompletionReport, Dispatcher, Outcome};
pub use queue::Admission;
pub use state::{EntryState, VisitStatus};
pub use storage::{PageRecord, SqliteStorage, UrlEntry, VisitRecord};
pub use url::{canonicalize_url, extract_domain};
pub use worker::{PoolStats, WorkerPool, WorkerStats};
