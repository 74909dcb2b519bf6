//! Page processor interface
//!
//! The scheduler never interprets page content. A `PageProcessor` fetches
//! and parses one URL and reports what it found; the worker stores the
//! outcome and re-submits the discovered links.

mod http;
mod parser;

pub use http::HttpPageProcessor;
pub use parser::{extract_page, parse_html, ParsedPage};

use crate::telemetry::Step;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors a page processor can report
///
/// Every variant ends with the entry marked `failed`.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Content-Type mismatch: {0}")]
    ContentMismatch(String),

    #[error("Processing error: {0}")]
    Other(String),
}

/// What a processor found at one URL
#[derive(Debug, Clone, Default)]
pub struct PageOutcome {
    pub title: Option<String>,
    pub text: String,
    pub html: String,
    /// Absolute URLs discovered on the page
    pub links: Vec<String>,
    pub step_durations: BTreeMap<Step, Duration>,
    /// Set when the processor produced a result but considers the page failed
    pub error: Option<String>,
}

/// Fetches and parses a single URL
#[async_trait]
pub trait PageProcessor: Send + Sync {
    async fn process(&self, url: &str) -> Result<PageOutcome, ProcessError>;
}
