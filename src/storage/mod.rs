//! Storage module for persisting scheduler state
//!
//! This module handles all database operations for the scheduler, including:
//! - SQLite database initialization and schema management
//! - Work queue rows (one per canonical URL)
//! - Visit ledger rows (last visit per canonical URL)
//! - Saved page content (latest successful fetch per canonical URL)
//! - Transaction control for all-or-nothing dispatcher operations

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{EntryState, VisitStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a work queue entry in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlEntry {
    pub url: String,
    pub domain: String,
    pub priority: i64,
    /// Insertion sequence, the FIFO tie-break between equal priorities
    pub seq: i64,
    pub state: EntryState,
    pub claimed_by: Option<String>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents the last recorded visit of a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitRecord {
    pub url: String,
    pub last_visited_at: DateTime<Utc>,
    pub last_status: VisitStatus,
    pub visit_count: u32,
}

/// Content saved from the latest successful visit of a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub html: String,
    pub saved_at: DateTime<Utc>,
}

/// Number of queue entries in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: u64,
    pub claimed: u64,
    pub done: u64,
    pub failed: u64,
}

impl StateCounts {
    pub fn get(&self, state: EntryState) -> u64 {
        match state {
            EntryState::Pending => self.pending,
            EntryState::Claimed => self.claimed,
            EntryState::Done => self.done,
            EntryState::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.claimed + self.done + self.failed
    }
}

/// Formats a timestamp the way it is stored
///
/// Fixed microsecond precision keeps the text form sortable, so SQL
/// comparisons on timestamp columns order chronologically.
pub(crate) fn to_db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub(crate) fn from_db_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}
