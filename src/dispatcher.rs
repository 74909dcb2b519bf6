//! Dispatcher
//!
//! Owns every transition of a queue entry and every write to the visit
//! ledger. Each operation runs as one SQLite transaction under the
//! dispatcher lock, so it is all-or-nothing and serialized against every
//! other operation.

use crate::config::DispatcherConfig;
use crate::ledger::VisitLedger;
use crate::queue::{Admission, WorkQueue};
use crate::state::{EntryState, VisitStatus};
use crate::storage::{
    PageRecord, SqliteStorage, StateCounts, Storage, StorageError, StorageResult, UrlEntry,
    VisitRecord,
};
use crate::url::{canonicalize_url, extract_domain};
use crate::{AdmissionError, Result, SchedulerError, UrlError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Result of processing one claimed entry, as reported by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// What happened to the links reported with a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub admitted: usize,
    pub duplicate: usize,
    pub cooldown_rejected: usize,
    /// Links that did not canonicalize
    pub invalid: usize,
    /// Links dropped because storage was unavailable
    pub unavailable: usize,
}

impl CompletionReport {
    fn count(&mut self, admission: Admission) {
        match admission {
            Admission::Admitted => self.admitted += 1,
            Admission::Duplicate => self.duplicate += 1,
            Admission::CooldownRejected => self.cooldown_rejected += 1,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub claimed: u64,
    pub done: u64,
    pub failed: u64,
    pub total_visits: u64,
}

impl QueueStats {
    fn new(counts: StateCounts, total_visits: u64) -> Self {
        Self {
            pending: counts.pending,
            claimed: counts.claimed,
            done: counts.done,
            failed: counts.failed,
            total_visits,
        }
    }
}

/// Rows removed by a history cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub entries_removed: usize,
    pub visits_removed: usize,
    pub pages_removed: usize,
}

/// Serialized access point to the work queue and visit ledger
///
/// Shared between workers behind an `Arc`. All methods are blocking.
pub struct Dispatcher<S: Storage = SqliteStorage> {
    storage: Mutex<S>,
    ledger: VisitLedger,
    queue: WorkQueue,
    config: DispatcherConfig,
}

impl Dispatcher<SqliteStorage> {
    /// Opens the database at `path` and recovers abandoned claims
    pub fn open(path: &Path, config: DispatcherConfig) -> Result<Self> {
        let storage = SqliteStorage::new(path)?;
        Self::new(storage, config)
    }
}

impl<S: Storage> Dispatcher<S> {
    /// Creates a dispatcher over `storage`
    ///
    /// Entries left `claimed` by a previous process are returned to
    /// `pending`: a claim never survives the process that made it.
    pub fn new(mut storage: S, config: DispatcherConfig) -> Result<Self> {
        let released = storage.release_claimed(Utc::now())?;
        if released > 0 {
            info!(
                "Recovered {} abandoned claim(s) from a previous run",
                released
            );
        }

        Ok(Self {
            storage: Mutex::new(storage),
            ledger: VisitLedger::new(config.cooldown()),
            queue: WorkQueue,
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ===== Admission =====

    /// Submits a URL for crawling
    ///
    /// The ledger check and the enqueue run in one critical section, so two
    /// simultaneous submissions of the same URL cannot both pass the check.
    ///
    /// # Returns
    ///
    /// * `Ok(Admission)` - admitted, duplicate or cooldown-rejected
    /// * `Err(SchedulerError::Admission(_))` - malformed URL or unavailable
    ///   storage; the URL was not admitted
    pub fn submit(&self, url: &str, priority: i64) -> Result<Admission> {
        let (canonical, domain) = canonicalize_with_domain(url).map_err(AdmissionError::from)?;

        let now = Utc::now();
        let admission = self
            .transaction(|storage| self.admit(storage, &canonical, &domain, priority, now))
            .map_err(|e| match e {
                SchedulerError::Storage(se) => AdmissionError::StorageUnavailable(se).into(),
                other => other,
            })?;

        debug!("Submitted {} (priority {}): {}", canonical, priority, admission);
        Ok(admission)
    }

    fn admit(
        &self,
        storage: &mut S,
        url: &str,
        domain: &str,
        priority: i64,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        if !self.ledger.is_eligible(&*storage, url, now)? {
            return Ok(Admission::CooldownRejected);
        }
        Ok(self.queue.enqueue(storage, url, domain, priority, now)?)
    }

    // ===== Claim / Complete =====

    /// Claims the highest-ordered pending entry for `worker_id`
    ///
    /// Never waits for work: returns `Ok(None)` when nothing is pending.
    pub fn claim(&self, worker_id: &str) -> Result<Option<UrlEntry>> {
        let claimed = self.transaction(|storage| {
            Ok(self.queue.claim_next(storage, worker_id, Utc::now())?)
        })?;

        if let Some(entry) = &claimed {
            debug!(
                "{} claimed {} (attempt {})",
                worker_id, entry.url, entry.attempt_count
            );
        }
        Ok(claimed)
    }

    /// Records the outcome of a claimed entry
    ///
    /// The state transition and the ledger write commit together. On
    /// success, up to `max_links_per_page` discovered links are then
    /// submitted through the normal admission path; a link that cannot be
    /// admitted is counted in the report and never fails the completion.
    pub fn complete(&self, url: &str, outcome: &Outcome, links: &[String]) -> Result<CompletionReport> {
        let now = Utc::now();
        self.transaction(|storage| self.finish(storage, url, outcome, now))?;

        let mut report = CompletionReport::default();
        if !outcome.is_success() {
            return Ok(report);
        }

        let limit = match self.config.max_links_per_page {
            0 => links.len(),
            n => n.min(links.len()),
        };
        for link in &links[..limit] {
            match self.submit(link, self.config.default_link_priority) {
                Ok(admission) => report.count(admission),
                Err(SchedulerError::Admission(AdmissionError::MalformedUrl(e))) => {
                    debug!("Skipping link {} from {}: {}", link, url, e);
                    report.invalid += 1;
                }
                Err(e) => {
                    warn!("Could not submit link {} from {}: {}", link, url, e);
                    report.unavailable += 1;
                }
            }
        }

        Ok(report)
    }

    fn finish(
        &self,
        storage: &mut S,
        url: &str,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (target, status, error) = match outcome {
            Outcome::Success => (EntryState::Done, VisitStatus::Success, None),
            Outcome::Failure(error) => (EntryState::Failed, VisitStatus::Failure, Some(error.as_str())),
        };

        let entry = storage
            .get_entry(url)?
            .ok_or_else(|| SchedulerError::EntryNotFound(url.to_string()))?;

        if !entry.state.can_transition_to(target) {
            return Err(SchedulerError::InvalidTransition {
                url: url.to_string(),
                from: entry.state,
                to: target,
            });
        }

        if !storage.finish_entry(url, target, error, now)? {
            return Err(SchedulerError::InvalidTransition {
                url: url.to_string(),
                from: entry.state,
                to: target,
            });
        }
        self.ledger.record_visit(storage, url, status, now)?;

        Ok(())
    }

    /// Stores the content of a page processed by `url`'s claimant
    ///
    /// Called before `complete` on success; a later save of the same URL
    /// replaces this one.
    pub fn save_page(&self, url: &str, title: Option<&str>, text: &str, html: &str) -> Result<()> {
        let now = Utc::now();
        self.transaction(|storage| Ok(storage.upsert_page(url, title, text, html, now)?))
    }

    /// Gives a claimed entry back to the queue without recording a visit
    ///
    /// Used when an outcome could not be recorded. Returns false if the
    /// entry was not claimed.
    pub fn release(&self, url: &str) -> Result<bool> {
        let now = Utc::now();
        let released = self.transaction(|storage| Ok(storage.release_entry(url, now)?))?;
        if released {
            info!("Released claim on {}", url);
        }
        Ok(released)
    }

    // ===== Queries =====

    /// Returns true if `url` would pass the cooldown check right now
    pub fn is_eligible(&self, url: &str) -> Result<bool> {
        let (canonical, _) = canonicalize_with_domain(url)?;
        let storage = self.lock()?;
        Ok(self.ledger.is_eligible(&*storage, &canonical, Utc::now())?)
    }

    /// Number of pending entries
    pub fn size(&self) -> Result<u64> {
        let storage = self.lock()?;
        Ok(self.queue.size(&*storage)?)
    }

    /// The next `n` pending entries in claim order
    pub fn peek(&self, n: usize) -> Result<Vec<UrlEntry>> {
        let storage = self.lock()?;
        Ok(self.queue.peek(&*storage, n)?)
    }

    /// Counts of entries per state plus the number of ledger rows
    pub fn stats(&self) -> Result<QueueStats> {
        let storage = self.lock()?;
        let counts = storage.count_by_state()?;
        let total_visits = storage.count_visits()?;
        Ok(QueueStats::new(counts, total_visits))
    }

    /// The queue entry for `url`, if any
    pub fn entry(&self, url: &str) -> Result<Option<UrlEntry>> {
        let (canonical, _) = canonicalize_with_domain(url)?;
        let storage = self.lock()?;
        Ok(storage.get_entry(&canonical)?)
    }

    /// The ledger record for `url`, if any
    pub fn visit(&self, url: &str) -> Result<Option<VisitRecord>> {
        let (canonical, _) = canonicalize_with_domain(url)?;
        let storage = self.lock()?;
        Ok(storage.get_visit(&canonical)?)
    }

    /// The saved content for `url`, if any
    pub fn page(&self, url: &str) -> Result<Option<PageRecord>> {
        let (canonical, _) = canonicalize_with_domain(url)?;
        let storage = self.lock()?;
        Ok(storage.get_page(&canonical)?)
    }

    /// Most recently visited URLs, newest first
    pub fn recent_visits(&self, limit: usize) -> Result<Vec<VisitRecord>> {
        let storage = self.lock()?;
        Ok(storage.recent_visits(limit)?)
    }

    /// Entry counts per domain, largest first
    pub fn domain_counts(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let storage = self.lock()?;
        Ok(storage.domain_counts(limit)?)
    }

    // ===== Maintenance =====

    /// Drops every pending entry
    ///
    /// Claimed work, finished history and the ledger are untouched.
    pub fn clear_queue(&self) -> Result<usize> {
        let cleared = self.transaction(|storage| Ok(storage.clear_pending()?))?;
        info!("Cleared {} pending entries", cleared);
        Ok(cleared)
    }

    /// Deletes finished entries and ledger rows older than `older_than`
    ///
    /// The cutoff is never more recent than the cooldown window, so a
    /// cleanup cannot make a recently visited URL eligible again.
    pub fn cleanup_history(&self, older_than: Duration) -> Result<CleanupReport> {
        let retention = older_than.max(self.ledger.cooldown());
        let cutoff = Utc::now() - retention;

        let report = self.transaction(|storage| {
            Ok(CleanupReport {
                entries_removed: storage.purge_finished_before(cutoff)?,
                visits_removed: storage.purge_visits_before(cutoff)?,
                pages_removed: storage.purge_pages_before(cutoff)?,
            })
        })?;

        info!(
            "History cleanup before {}: {} entries, {} visits, {} pages removed",
            cutoff.to_rfc3339(),
            report.entries_removed,
            report.visits_removed,
            report.pages_removed
        );
        Ok(report)
    }

    // ===== Internals =====

    fn lock(&self) -> StorageResult<MutexGuard<'_, S>> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Corrupt("lock poisoned".to_string()))
    }

    /// Runs `op` in one write transaction, retrying transient storage errors
    ///
    /// Any error rolls the transaction back. Busy/locked errors are retried
    /// up to `storage_retries` times with a doubling backoff; everything
    /// else is returned as is.
    fn transaction<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut S) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let mut storage = self.lock()?;
                run_in_transaction(&mut *storage, &mut op)
            };

            match result {
                Err(SchedulerError::Storage(e))
                    if e.is_transient() && attempt < self.config.storage_retries =>
                {
                    let backoff = retry_delay(self.config.storage_retry_backoff(), attempt);
                    warn!(
                        "Transient storage error (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.storage_retries,
                        backoff,
                        e
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_storage<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut storage = self.storage.lock().unwrap();
        f(&mut storage)
    }
}

/// Backoff before retry number `attempt` (0-based), doubling each time
fn retry_delay(base: StdDuration, attempt: u32) -> StdDuration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn run_in_transaction<S, T, F>(storage: &mut S, op: &mut F) -> Result<T>
where
    S: Storage,
    F: FnMut(&mut S) -> Result<T>,
{
    storage.begin()?;

    let result = op(storage).and_then(|value| {
        storage.commit()?;
        Ok(value)
    });

    if result.is_err() {
        if let Err(e) = storage.rollback() {
            warn!("Rollback failed: {}", e);
        }
    }
    result
}

fn canonicalize_with_domain(url: &str) -> std::result::Result<(String, String), UrlError> {
    let canonical = canonicalize_url(url)?;
    let domain = extract_domain(&canonical).ok_or(UrlError::MissingDomain)?;
    Ok((canonical.into(), domain))
}
