//! HTTP page processor
//!
//! Default `PageProcessor` used by the binary:
//! - GET request with the configured user agent and timeout
//! - Non-2xx responses and non-HTML content are reported as errors
//! - Title, text and links are extracted with `scraper`

use crate::config::HttpConfig;
use crate::processor::parser::extract_page;
use crate::processor::{PageOutcome, PageProcessor, ProcessError};
use crate::telemetry::Step;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::Html;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Content types accepted as HTML
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml"];

/// Fetches pages over HTTP and parses them as HTML
pub struct HttpPageProcessor {
    client: Client,
    same_domain_only: bool,
}

impl HttpPageProcessor {
    /// Builds a processor with its own HTTP client
    ///
    /// # Arguments
    ///
    /// * `config` - User agent, timeout and link policy
    ///
    /// # Returns
    ///
    /// * `Ok(HttpPageProcessor)` - Successfully built HTTP client
    /// * `Err(reqwest::Error)` - Failed to build client
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            same_domain_only: config.same_domain_only,
        })
    }

    async fn fetch(&self, url: &str) -> Result<(Url, String), ProcessError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !HTML_CONTENT_TYPES
            .iter()
            .any(|html_type| content_type.contains(html_type))
        {
            return Err(ProcessError::ContentMismatch(content_type));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(classify)?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl PageProcessor for HttpPageProcessor {
    async fn process(&self, url: &str) -> Result<PageOutcome, ProcessError> {
        let mut step_durations = BTreeMap::new();

        let fetch_start = Instant::now();
        let (final_url, html) = self.fetch(url).await?;
        step_durations.insert(Step::Fetch, fetch_start.elapsed());

        let parse_start = Instant::now();
        let document = Html::parse_document(&html);
        step_durations.insert(Step::Parse, parse_start.elapsed());

        let extract_start = Instant::now();
        let parsed = extract_page(&document, &final_url, self.same_domain_only);
        step_durations.insert(Step::Extract, extract_start.elapsed());

        debug!(
            "Parsed {}: {} links, {} chars of text",
            url,
            parsed.links.len(),
            parsed.text.len()
        );

        Ok(PageOutcome {
            title: parsed.title,
            text: parsed.text,
            html,
            links: parsed.links,
            step_durations,
            error: None,
        })
    }
}

fn classify(err: reqwest::Error) -> ProcessError {
    if err.is_timeout() {
        ProcessError::Timeout
    } else {
        ProcessError::Http(err)
    }
}
