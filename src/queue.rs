//! Work queue
//!
//! Priority-ordered queue of canonical URLs, one row per URL. Entries are
//! claimed by `(priority DESC, seq ASC)`: strict priority with a FIFO
//! tie-break on insertion sequence.

use crate::state::EntryState;
use crate::storage::{Storage, StorageResult, UrlEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Result of submitting a URL for admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Admission {
    /// A new pending entry was created (or a finished one re-admitted)
    Admitted,

    /// A pending or claimed entry already exists for the URL
    Duplicate,

    /// The URL was visited within the cooldown window
    CooldownRejected,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Duplicate => "duplicate",
            Self::CooldownRejected => "cooldown-rejected",
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue operations over a storage backend
///
/// The queue deduplicates on its own, independent of the ledger's
/// time-based rule. Callers provide the transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkQueue;

impl WorkQueue {
    /// Adds `url` to the queue unless it already has in-flight work
    ///
    /// A `done` or `failed` row is reset to `pending` at the back of its
    /// priority class.
    ///
    /// # Returns
    ///
    /// `Admission::Admitted` or `Admission::Duplicate`
    pub fn enqueue<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        url: &str,
        domain: &str,
        priority: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<Admission> {
        match storage.get_entry(url)? {
            Some(entry) if entry.state.is_in_flight() => Ok(Admission::Duplicate),
            Some(_) => {
                storage.readmit_entry(url, priority, now)?;
                Ok(Admission::Admitted)
            }
            None => {
                storage.insert_entry(url, domain, priority, now)?;
                Ok(Admission::Admitted)
            }
        }
    }

    /// Claims the highest-ordered pending entry for `worker_id`
    ///
    /// Must run inside a write transaction so the select and the update
    /// see the same snapshot.
    pub fn claim_next<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<UrlEntry>> {
        let Some(next) = storage.next_pending()? else {
            return Ok(None);
        };

        if !storage.mark_claimed(&next.url, worker_id, now)? {
            return Ok(None);
        }

        Ok(Some(UrlEntry {
            state: EntryState::Claimed,
            claimed_by: Some(worker_id.to_string()),
            attempt_count: next.attempt_count + 1,
            updated_at: now,
            ..next
        }))
    }

    /// Number of pending entries
    pub fn size<S: Storage + ?Sized>(&self, storage: &S) -> StorageResult<u64> {
        Ok(storage.count_by_state()?.pending)
    }

    /// The next `n` pending entries in claim order, without claiming them
    pub fn peek<S: Storage + ?Sized>(&self, storage: &S, n: usize) -> StorageResult<Vec<UrlEntry>> {
        storage.peek_pending(n)
    }
}
