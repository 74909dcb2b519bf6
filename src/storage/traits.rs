//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{EntryState, VisitStatus};
use crate::storage::{PageRecord, StateCounts, UrlEntry, VisitRecord};
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt storage: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if retrying the operation may succeed
    ///
    /// Only lock contention on the database file qualifies.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the dispatcher.
/// Callers that need several operations to be all-or-nothing wrap them in
/// `begin` / `commit`, and call `rollback` on any error.
pub trait Storage {
    // ===== Transactions =====

    /// Starts a write transaction, taking the write lock immediately
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the current transaction
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the current transaction
    fn rollback(&mut self) -> StorageResult<()>;

    // ===== Work Queue =====

    /// Gets the queue entry for a canonical URL
    fn get_entry(&self, url: &str) -> StorageResult<Option<UrlEntry>>;

    /// Inserts a new pending entry at the back of its priority class
    ///
    /// # Arguments
    ///
    /// * `url` - The canonical URL
    /// * `domain` - The host extracted from the URL
    /// * `priority` - Higher values are claimed first
    /// * `now` - Creation timestamp
    fn insert_entry(
        &mut self,
        url: &str,
        domain: &str,
        priority: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Moves a finished entry back to pending with a fresh insertion sequence
    ///
    /// `attempt_count` and `last_error` are kept until the next outcome.
    fn readmit_entry(&mut self, url: &str, priority: i64, now: DateTime<Utc>)
        -> StorageResult<()>;

    /// Gets the highest-ordered pending entry without changing it
    fn next_pending(&self) -> StorageResult<Option<UrlEntry>>;

    /// Marks a pending entry as claimed by a worker
    ///
    /// # Returns
    ///
    /// `true` if the entry was pending and is now claimed, `false` otherwise
    fn mark_claimed(&mut self, url: &str, worker_id: &str, now: DateTime<Utc>)
        -> StorageResult<bool>;

    /// Moves a claimed entry to a terminal state
    ///
    /// A successful finish clears `last_error`; a failed one stores it.
    ///
    /// # Returns
    ///
    /// `true` if the entry was claimed and has been updated
    fn finish_entry(
        &mut self,
        url: &str,
        state: EntryState,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Gets up to `limit` pending entries in claim order
    fn peek_pending(&self, limit: usize) -> StorageResult<Vec<UrlEntry>>;

    /// Counts queue entries by state
    fn count_by_state(&self) -> StorageResult<StateCounts>;

    /// Deletes every pending entry
    fn clear_pending(&mut self) -> StorageResult<usize>;

    /// Returns one claimed entry to pending
    ///
    /// # Returns
    ///
    /// `true` if the entry was claimed and is pending again
    fn release_entry(&mut self, url: &str, now: DateTime<Utc>) -> StorageResult<bool>;

    /// Returns every claimed entry to pending (crash recovery)
    fn release_claimed(&mut self, now: DateTime<Utc>) -> StorageResult<usize>;

    /// Deletes done and failed entries last updated before `cutoff`
    fn purge_finished_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    /// Counts queue entries per domain, largest first
    fn domain_counts(&self, limit: usize) -> StorageResult<Vec<(String, u64)>>;

    // ===== Visit Ledger =====

    /// Gets the visit record for a canonical URL
    fn get_visit(&self, url: &str) -> StorageResult<Option<VisitRecord>>;

    /// Records a visit; the newer timestamp wins
    fn upsert_visit(
        &mut self,
        url: &str,
        status: VisitStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets the most recently visited URLs
    fn recent_visits(&self, limit: usize) -> StorageResult<Vec<VisitRecord>>;

    /// Counts visit records
    fn count_visits(&self) -> StorageResult<u64>;

    /// Deletes visit records last visited before `cutoff`
    fn purge_visits_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    // ===== Page Content =====

    /// Stores the content of a page, replacing any earlier copy
    fn upsert_page(
        &mut self,
        url: &str,
        title: Option<&str>,
        text: &str,
        html: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets the saved content for a canonical URL
    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Deletes pages saved before `cutoff`
    fn purge_pages_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn test_busy_is_transient() {
        let err = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_errors_are_not_transient() {
        let err = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CORRUPT),
            None,
        ));
        assert!(!err.is_transient());
        assert!(!StorageError::Corrupt("bad row".to_string()).is_transient());
    }
}
