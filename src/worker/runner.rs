//! Worker loop
//!
//! claim -> process -> complete -> delay, until shutdown is signaled.
//! Shutdown is observed only between items; an item in progress always
//! runs to completion.

use crate::config::WorkersConfig;
use crate::dispatcher::{CompletionReport, Dispatcher, Outcome};
use crate::processor::{PageOutcome, PageProcessor, ProcessError};
use crate::storage::UrlEntry;
use crate::telemetry::{Step, UrlTiming};
use crate::worker::state::WorkerState;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub(crate) struct Worker {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) processor: Arc<dyn PageProcessor>,
    pub(crate) config: WorkersConfig,
    pub(crate) state: WorkerState,
    pub(crate) state_tx: watch::Sender<WorkerState>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        info!("Worker {} started", self.state.id);
        self.publish();

        let mut consecutive_errors: u32 = 0;

        while !self.shutdown_requested() {
            let delay = match self.claim().await {
                Ok(Some(entry)) => {
                    match self.process_entry(entry).await {
                        Ok(()) => consecutive_errors = 0,
                        Err(e) => {
                            consecutive_errors += 1;
                            error!("Worker {} could not record outcome: {}", self.state.id, e);
                        }
                    }
                    self.backoff_or(consecutive_errors, self.config.inter_request_delay())
                }
                Ok(None) => self.config.idle_poll(),
                Err(e) => {
                    consecutive_errors += 1;
                    error!("Worker {} could not claim work: {}", self.state.id, e);
                    self.backoff_or(consecutive_errors, self.config.idle_poll())
                }
            };

            if consecutive_errors >= self.config.max_consecutive_errors.max(1) {
                consecutive_errors = 0;
            }

            if self.pause(delay).await {
                break;
            }
        }

        self.state.running = false;
        self.publish();
        info!(
            "Worker {} stopped ({} processed, {} failed)",
            self.state.id, self.state.processed_count, self.state.failed_count
        );
    }

    /// The extended error pause once too many errors happened in a row
    fn backoff_or(&self, consecutive_errors: u32, normal: Duration) -> Duration {
        if consecutive_errors >= self.config.max_consecutive_errors.max(1) {
            warn!(
                "Worker {} hit {} consecutive errors, pausing for {:?}",
                self.state.id,
                consecutive_errors,
                self.config.error_backoff()
            );
            self.config.error_backoff()
        } else {
            normal
        }
    }

    async fn claim(&self) -> Result<Option<UrlEntry>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let worker_id = self.state.id.clone();
        tokio::task::spawn_blocking(move || dispatcher.claim(&worker_id)).await?
    }

    /// Processes one claimed entry and reports the outcome
    ///
    /// Processor errors, panics and timeouts become a failed completion.
    /// Only a failure to record the completion is returned; the claim is
    /// then released so the entry goes back to the queue.
    async fn process_entry(&mut self, entry: UrlEntry) -> Result<()> {
        let started = Instant::now();
        let mut timing = UrlTiming::new(entry.url.clone(), Utc::now());

        debug!("Worker {} processing {}", self.state.id, entry.url);
        let fetch_start = Instant::now();
        let result = self.run_processor(&entry.url).await;

        let (outcome, links) = match result {
            Ok(page) => {
                for (step, duration) in &page.step_durations {
                    timing.set_step(*step, *duration);
                }
                match page.error {
                    Some(error) => (Outcome::Failure(error), Vec::new()),
                    None => {
                        let save_start = Instant::now();
                        let saved = self.save(&entry.url, page.title, page.text, page.html).await;
                        timing.set_step(Step::Save, save_start.elapsed());
                        match saved {
                            Ok(()) => (Outcome::Success, page.links),
                            Err(e) => (Outcome::Failure(format!("Save error: {}", e)), Vec::new()),
                        }
                    }
                }
            }
            Err(error) => {
                // No breakdown from the processor, so the attempt counts as the fetch
                timing.set_step(Step::Fetch, fetch_start.elapsed());
                (Outcome::Failure(error), Vec::new())
            }
        };
        if let Outcome::Failure(error) = &outcome {
            timing.error = Some(error.clone());
        }

        let mut add_links_start = Instant::now();
        let mut completion = self.complete(&entry.url, &outcome, &links).await;
        if let Err(e) = &completion {
            warn!(
                "Worker {} could not record outcome for {}: {}; retrying in {:?}",
                self.state.id,
                entry.url,
                e,
                self.config.error_backoff()
            );
            tokio::time::sleep(self.config.error_backoff()).await;
            add_links_start = Instant::now();
            completion = self.complete(&entry.url, &outcome, &links).await;
        }
        timing.set_step(Step::AddLinks, add_links_start.elapsed());
        timing.total_secs = started.elapsed().as_secs_f64();

        let result = match completion {
            Ok(report) => {
                match &outcome {
                    Outcome::Success => {
                        self.state.processed_count += 1;
                        info!(
                            "Worker {} processed {} in {:.2}s ({} new links)",
                            self.state.id, entry.url, timing.total_secs, report.admitted
                        );
                    }
                    Outcome::Failure(error) => {
                        self.state.failed_count += 1;
                        warn!("Worker {} failed {}: {}", self.state.id, entry.url, error);
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.release(&entry.url).await;
                timing.error = Some(e.to_string());
                Err(e)
            }
        };

        self.state.telemetry.record(timing);
        self.state.last_activity = Some(Utc::now());
        self.publish();
        result
    }

    async fn save(&self, url: &str, title: Option<String>, text: String, html: String) -> Result<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || dispatcher.save_page(&url, title.as_deref(), &text, &html))
            .await?
    }

    async fn complete(
        &self,
        url: &str,
        outcome: &Outcome,
        links: &[String],
    ) -> Result<CompletionReport> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let url = url.to_string();
        let outcome = outcome.clone();
        let links = links.to_vec();
        tokio::task::spawn_blocking(move || dispatcher.complete(&url, &outcome, &links)).await?
    }

    /// Puts an entry whose outcome could not be recorded back in the queue
    async fn release(&self, url: &str) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let owned_url = url.to_string();
        let released = tokio::task::spawn_blocking(move || dispatcher.release(&owned_url))
            .await
            .map_err(crate::SchedulerError::from)
            .and_then(|result| result);
        match released {
            Ok(true) => warn!("Worker {} released claim on {}", self.state.id, url),
            Ok(false) => debug!("Worker {} found {} no longer claimed", self.state.id, url),
            Err(e) => error!(
                "Worker {} could not release {}; it stays claimed until restart: {}",
                self.state.id, url, e
            ),
        }
    }

    /// Runs the processor in its own task, bounded by the processing timeout
    async fn run_processor(&self, url: &str) -> std::result::Result<PageOutcome, String> {
        let processor = Arc::clone(&self.processor);
        let owned_url = url.to_string();
        let mut task = tokio::spawn(async move { processor.process(&owned_url).await });

        let timeout = self.config.processing_timeout();
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(page))) => Ok(page),
            Ok(Ok(Err(e))) => Err(describe(e)),
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err("Processing error: page processor panicked".to_string())
            }
            Ok(Err(join_error)) => Err(format!("Processing error: {}", join_error)),
            Err(_) => {
                task.abort();
                Err(format!("Timeout: no result after {}s", timeout.as_secs()))
            }
        }
    }

    /// Sleeps for `duration` unless shutdown is signaled first
    ///
    /// Returns true if the worker should stop.
    async fn pause(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.shutdown_requested();
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.shutdown_requested(),
            // Also fires when the pool dropped the sender
            _ = self.shutdown.changed() => true,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

fn describe(error: ProcessError) -> String {
    match error {
        ProcessError::Timeout => "Timeout: request timed out".to_string(),
        other => other.to_string(),
    }
}
