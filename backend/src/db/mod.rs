//! SQLite storage for members, bookings, unmatched bookings, the import
//! ledger and tier conflicts.
//!
//! Every handler opens its own [`Connection`] through [`open`]. Writers wait
//! on each other through the busy timeout instead of failing, and callers
//! that need check-then-write atomicity wrap their statements in an
//! IMMEDIATE transaction (see [`write_transaction`]).

pub mod bookings;
pub mod conflicts;
pub mod import_runs;
pub mod members;
pub mod unmatched;

use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    email              TEXT NOT NULL COLLATE NOCASE UNIQUE,
    first_name         TEXT NOT NULL DEFAULT '',
    last_name          TEXT NOT NULL DEFAULT '',
    phone              TEXT,
    tier               TEXT NOT NULL DEFAULT 'Guest',
    tags               TEXT NOT NULL DEFAULT '[]',
    lifetime_visits    INTEGER NOT NULL DEFAULT 0,
    external_client_id TEXT,
    linked_emails      TEXT NOT NULL DEFAULT '[]',
    updated_at         TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS members_external_client_id ON members (external_client_id);

CREATE TABLE IF NOT EXISTS booking_records (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id      TEXT NOT NULL UNIQUE,
    member_email     TEXT NOT NULL COLLATE NOCASE,
    member_name      TEXT NOT NULL DEFAULT '',
    resource_id      TEXT,
    date             TEXT NOT NULL,
    start_time       TEXT NOT NULL,
    end_time         TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    party_size       INTEGER NOT NULL DEFAULT 1,
    status           TEXT NOT NULL,
    notes            TEXT NOT NULL DEFAULT '',
    booked_at        TEXT,
    match_strategy   TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS booking_records_member ON booking_records (member_email);

CREATE TABLE IF NOT EXISTS unmatched_bookings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id      TEXT NOT NULL UNIQUE,
    raw_name         TEXT NOT NULL DEFAULT '',
    raw_email        TEXT NOT NULL DEFAULT '',
    date             TEXT NOT NULL,
    start_time       TEXT NOT NULL,
    end_time         TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    status           TEXT NOT NULL,
    resource_id      TEXT,
    party_size       INTEGER NOT NULL DEFAULT 1,
    notes            TEXT NOT NULL DEFAULT '',
    booked_at        TEXT,
    failure_reason   TEXT NOT NULL,
    resolved_email   TEXT,
    resolved_by      TEXT,
    resolved_at      TEXT
);
CREATE INDEX IF NOT EXISTS unmatched_bookings_raw_email ON unmatched_bookings (raw_email);

CREATE TABLE IF NOT EXISTS import_runs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    kind           TEXT NOT NULL,
    filename       TEXT NOT NULL,
    checksum       TEXT NOT NULL,
    total_rows     INTEGER NOT NULL,
    matched_rows   INTEGER NOT NULL,
    unmatched_rows INTEGER NOT NULL,
    skipped_rows   INTEGER NOT NULL,
    error_count    INTEGER NOT NULL,
    imported_by    TEXT NOT NULL,
    started_at     TEXT NOT NULL,
    completed_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tier_conflicts (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    email              TEXT NOT NULL COLLATE NOCASE,
    external_client_id TEXT,
    current_tier       TEXT NOT NULL,
    incoming_tier      TEXT NOT NULL,
    source             TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'open',
    resolution         TEXT,
    metadata           TEXT NOT NULL DEFAULT '{}',
    resolved_by        TEXT,
    resolved_at        TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS tier_conflicts_one_open
    ON tier_conflicts (email, source) WHERE status = 'open';
"#;

/// Opens the database file and makes sure the schema exists.
pub fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema, used by tests.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Starts a transaction that takes the write lock up front, so a
/// check-then-write sequence inside it cannot interleave with another writer.
pub fn write_transaction(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Reads a text column and parses it through `FromStr`.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

/// Reads a JSON text column.
pub(crate) fn json_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("club.sqlite");
        {
            let conn = open(&path).unwrap();
            conn.execute("INSERT INTO members (email) VALUES ('a@b.test')", [])
                .unwrap();
        }
        let conn = open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
