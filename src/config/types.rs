use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for crawl-queue
///
/// Every section is optional; missing sections take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub dispatcher: DispatcherConfig,
    pub workers: WorkersConfig,
    pub telemetry: TelemetryConfig,
    pub http: HttpConfig,
    pub seed: Vec<SeedEntry>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./crawl-queue.db".to_string(),
        }
    }
}

/// Admission and completion rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Minimum time between two visits of the same URL (seconds)
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,

    /// Priority given to links discovered on a processed page
    #[serde(rename = "default-link-priority")]
    pub default_link_priority: i64,

    /// Maximum number of discovered links submitted per page (0 = unlimited)
    #[serde(rename = "max-links-per-page")]
    pub max_links_per_page: usize,

    /// Retries for transient storage errors (busy/locked database)
    #[serde(rename = "storage-retries")]
    pub storage_retries: u32,

    /// Base backoff between storage retries, doubled per attempt (milliseconds)
    #[serde(rename = "storage-retry-backoff-ms")]
    pub storage_retry_backoff_ms: u64,
}

impl DispatcherConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs.min(i32::MAX as u64) as i64)
    }

    pub fn storage_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.storage_retry_backoff_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 24 * 60 * 60,
            default_link_priority: 0,
            max_links_per_page: 20,
            storage_retries: 3,
            storage_retry_backoff_ms: 50,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of workers started with the pool
    pub count: usize,

    /// Fixed delay between successive claims by one worker (milliseconds)
    #[serde(rename = "inter-request-delay-ms")]
    pub inter_request_delay_ms: u64,

    /// Sleep between polls while the queue is empty (milliseconds)
    #[serde(rename = "idle-poll-ms")]
    pub idle_poll_ms: u64,

    /// Time the page processor gets before the item is failed (seconds)
    #[serde(rename = "processing-timeout-secs")]
    pub processing_timeout_secs: u64,

    /// Consecutive loop-level errors before a worker pauses
    #[serde(rename = "max-consecutive-errors")]
    pub max_consecutive_errors: u32,

    /// Length of that pause (seconds)
    #[serde(rename = "error-backoff-secs")]
    pub error_backoff_secs: u64,
}

impl WorkersConfig {
    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 2,
            inter_request_delay_ms: 500,
            idle_poll_ms: 1000,
            processing_timeout_secs: 60,
            max_consecutive_errors: 5,
            error_backoff_secs: 30,
        }
    }
}

/// Per-worker timing telemetry limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Samples kept per step per worker
    #[serde(rename = "step-window")]
    pub step_window: usize,

    /// Full per-URL timing breakdowns kept per worker
    #[serde(rename = "recent-timings")]
    pub recent_timings: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            step_window: 100,
            recent_timings: 50,
        }
    }
}

/// Settings for the built-in HTTP page processor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Report only links on the same host as the page
    #[serde(rename = "same-domain-only")]
    pub same_domain_only: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("crawl-queue/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            same_domain_only: true,
        }
    }
}

/// A URL submitted when the pool starts
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,

    #[serde(default)]
    pub priority: i64,
}
