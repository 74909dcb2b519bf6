//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{EntryState, VisitStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    from_db_timestamp, to_db_timestamp, PageRecord, StateCounts, UrlEntry, VisitRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked database before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "url, domain, priority, seq, state, claimed_by, attempt_count, \
                             last_error, created_at, updated_at";

const VISIT_COLUMNS: &str = "url, last_visited_at, last_status, visit_count";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// A queue row as stored, before its text columns are validated
struct RawEntry {
    url: String,
    domain: String,
    priority: i64,
    seq: i64,
    state: String,
    claimed_by: Option<String>,
    attempt_count: u32,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            domain: row.get(1)?,
            priority: row.get(2)?,
            seq: row.get(3)?,
            state: row.get(4)?,
            claimed_by: row.get(5)?,
            attempt_count: row.get(6)?,
            last_error: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> StorageResult<UrlEntry> {
        let state = EntryState::from_db_string(&self.state).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown state '{}' for {}", self.state, self.url))
        })?;

        Ok(UrlEntry {
            created_at: from_db_timestamp(&self.created_at)?,
            updated_at: from_db_timestamp(&self.updated_at)?,
            url: self.url,
            domain: self.domain,
            priority: self.priority,
            seq: self.seq,
            state,
            claimed_by: self.claimed_by,
            attempt_count: self.attempt_count,
            last_error: self.last_error,
        })
    }
}

struct RawVisit {
    url: String,
    last_visited_at: String,
    last_status: String,
    visit_count: u32,
}

impl RawVisit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            last_visited_at: row.get(1)?,
            last_status: row.get(2)?,
            visit_count: row.get(3)?,
        })
    }

    fn into_visit(self) -> StorageResult<VisitRecord> {
        let last_status = VisitStatus::from_db_string(&self.last_status).ok_or_else(|| {
            StorageError::Corrupt(format!(
                "unknown visit status '{}' for {}",
                self.last_status, self.url
            ))
        })?;

        Ok(VisitRecord {
            last_visited_at: from_db_timestamp(&self.last_visited_at)?,
            url: self.url,
            last_status,
            visit_count: self.visit_count,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Transactions =====

    fn begin(&mut self) -> StorageResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        // Nothing to undo if the transaction never started
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ===== Work Queue =====

    fn get_entry(&self, url: &str) -> StorageResult<Option<UrlEntry>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM queue WHERE url = ?1", ENTRY_COLUMNS),
                params![url],
                RawEntry::from_row,
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    fn insert_entry(
        &mut self,
        url: &str,
        domain: &str,
        priority: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now = to_db_timestamp(&now);
        self.conn.execute(
            "INSERT INTO queue (url, domain, priority, seq, state, attempt_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM queue), ?4, 0, ?5, ?5)",
            params![url, domain, priority, EntryState::Pending.to_db_string(), now],
        )?;
        Ok(())
    }

    fn readmit_entry(
        &mut self,
        url: &str,
        priority: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now = to_db_timestamp(&now);
        self.conn.execute(
            "UPDATE queue
             SET state = ?1, priority = ?2, seq = (SELECT COALESCE(MAX(seq), 0) + 1 FROM queue),
                 claimed_by = NULL, created_at = ?3, updated_at = ?3
             WHERE url = ?4",
            params![EntryState::Pending.to_db_string(), priority, now, url],
        )?;
        Ok(())
    }

    fn next_pending(&self) -> StorageResult<Option<UrlEntry>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM queue WHERE state = ?1 ORDER BY priority DESC, seq ASC LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![EntryState::Pending.to_db_string()],
                RawEntry::from_row,
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    fn mark_claimed(
        &mut self,
        url: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE queue
             SET state = ?1, claimed_by = ?2, attempt_count = attempt_count + 1, updated_at = ?3
             WHERE url = ?4 AND state = ?5",
            params![
                EntryState::Claimed.to_db_string(),
                worker_id,
                to_db_timestamp(&now),
                url,
                EntryState::Pending.to_db_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn finish_entry(
        &mut self,
        url: &str,
        state: EntryState,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE queue
             SET state = ?1, claimed_by = NULL, last_error = ?2, updated_at = ?3
             WHERE url = ?4 AND state = ?5",
            params![
                state.to_db_string(),
                error,
                to_db_timestamp(&now),
                url,
                EntryState::Claimed.to_db_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn peek_pending(&self, limit: usize) -> StorageResult<Vec<UrlEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM queue WHERE state = ?1 ORDER BY priority DESC, seq ASC LIMIT ?2",
            ENTRY_COLUMNS
        ))?;

        let rows = stmt
            .query_map(
                params![EntryState::Pending.to_db_string(), limit as i64],
                RawEntry::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawEntry::into_entry).collect()
    }

    fn count_by_state(&self) -> StorageResult<StateCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM queue GROUP BY state")?;

        let rows = stmt.query_map([], |row| {
            let state_str: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((state_str, count))
        })?;

        let mut counts = StateCounts::default();
        for row in rows {
            let (state_str, count) = row?;
            let count = count as u64;
            match EntryState::from_db_string(&state_str) {
                Some(EntryState::Pending) => counts.pending = count,
                Some(EntryState::Claimed) => counts.claimed = count,
                Some(EntryState::Done) => counts.done = count,
                Some(EntryState::Failed) => counts.failed = count,
                None => {
                    return Err(StorageError::Corrupt(format!(
                        "unknown state '{}' in queue",
                        state_str
                    )))
                }
            }
        }

        Ok(counts)
    }

    fn clear_pending(&mut self) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM queue WHERE state = ?1",
            params![EntryState::Pending.to_db_string()],
        )?;
        Ok(deleted)
    }

    fn release_entry(&mut self, url: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE queue SET state = ?1, claimed_by = NULL, updated_at = ?2
             WHERE url = ?3 AND state = ?4",
            params![
                EntryState::Pending.to_db_string(),
                to_db_timestamp(&now),
                url,
                EntryState::Claimed.to_db_string(),
            ],
        )?;
        Ok(updated == 1)
    }

    fn release_claimed(&mut self, now: DateTime<Utc>) -> StorageResult<usize> {
        let released = self.conn.execute(
            "UPDATE queue SET state = ?1, claimed_by = NULL, updated_at = ?2 WHERE state = ?3",
            params![
                EntryState::Pending.to_db_string(),
                to_db_timestamp(&now),
                EntryState::Claimed.to_db_string(),
            ],
        )?;
        Ok(released)
    }

    fn purge_finished_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM queue WHERE state IN (?1, ?2) AND updated_at < ?3",
            params![
                EntryState::Done.to_db_string(),
                EntryState::Failed.to_db_string(),
                to_db_timestamp(&cutoff),
            ],
        )?;
        Ok(deleted)
    }

    fn domain_counts(&self, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, COUNT(*) as count FROM queue
             GROUP BY domain ORDER BY count DESC, domain ASC LIMIT ?1",
        )?;

        let counts = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    // ===== Visit Ledger =====

    fn get_visit(&self, url: &str) -> StorageResult<Option<VisitRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM visits WHERE url = ?1", VISIT_COLUMNS),
                params![url],
                RawVisit::from_row,
            )
            .optional()?;

        raw.map(RawVisit::into_visit).transpose()
    }

    fn upsert_visit(
        &mut self,
        url: &str,
        status: VisitStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        // SET expressions read the pre-update row, so the CASE and MAX agree
        self.conn.execute(
            "INSERT INTO visits (url, last_visited_at, last_status, visit_count)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(url) DO UPDATE SET
                 last_status = CASE WHEN excluded.last_visited_at >= last_visited_at
                                    THEN excluded.last_status ELSE last_status END,
                 last_visited_at = MAX(last_visited_at, excluded.last_visited_at),
                 visit_count = visit_count + 1",
            params![url, to_db_timestamp(&at), status.to_db_string()],
        )?;
        Ok(())
    }

    fn recent_visits(&self, limit: usize) -> StorageResult<Vec<VisitRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM visits ORDER BY last_visited_at DESC LIMIT ?1",
            VISIT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], RawVisit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawVisit::into_visit).collect()
    }

    fn count_visits(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn purge_visits_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM visits WHERE last_visited_at < ?1",
            params![to_db_timestamp(&cutoff)],
        )?;
        Ok(deleted)
    }

    // ===== Page Content =====

    fn upsert_page(
        &mut self,
        url: &str,
        title: Option<&str>,
        text: &str,
        html: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO pages (url, title, text, html, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                 title = excluded.title,
                 text = excluded.text,
                 html = excluded.html,
                 saved_at = excluded.saved_at",
            params![url, title, text, html, to_db_timestamp(&at)],
        )?;
        Ok(())
    }

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT url, title, text, html, saved_at FROM pages WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        raw.map(|(url, title, text, html, saved_at)| {
            Ok(PageRecord {
                saved_at: from_db_timestamp(&saved_at)?,
                url,
                title,
                text,
                html,
            })
        })
        .transpose()
    }

    fn purge_pages_before(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM pages WHERE saved_at < ?1",
            params![to_db_timestamp(&cutoff)],
        )?;
        Ok(deleted)
    }
}
