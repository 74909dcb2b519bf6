//! Database schema definitions
//!
//! This module contains the SQL schema for the crawl-queue database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Work queue, one row per canonical URL
CREATE TABLE IF NOT EXISTS queue (
    url TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    seq INTEGER NOT NULL,
    state TEXT NOT NULL,
    claimed_by TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_claim_order ON queue(state, priority DESC, seq ASC);
CREATE INDEX IF NOT EXISTS idx_queue_domain ON queue(domain);

-- Visit ledger, last visit per canonical URL
CREATE TABLE IF NOT EXISTS visits (
    url TEXT PRIMARY KEY,
    last_visited_at TEXT NOT NULL,
    last_status TEXT NOT NULL,
    visit_count INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_visits_last_visited ON visits(last_visited_at);

-- Page content, overwritten on every successful visit
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    title TEXT,
    text TEXT NOT NULL,
    html TEXT NOT NULL,
    saved_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["queue", "visits", "pages"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
