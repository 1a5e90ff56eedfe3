use super::parse_column;
use chrono::NaiveDateTime;
use club_common::model::import::{ImportKind, ImportRun};
use rusqlite::{params, Connection, Row};

/// A ledger entry about to be appended.
pub struct NewImportRun<'a> {
    pub kind: ImportKind,
    pub filename: &'a str,
    pub checksum: &'a str,
    pub total_rows: u32,
    pub matched_rows: u32,
    pub unmatched_rows: u32,
    pub skipped_rows: u32,
    pub error_count: u32,
    pub imported_by: &'a str,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    Ok(ImportRun {
        id: row.get(0)?,
        kind: parse_column(row, 1)?,
        filename: row.get(2)?,
        checksum: row.get(3)?,
        total_rows: row.get(4)?,
        matched_rows: row.get(5)?,
        unmatched_rows: row.get(6)?,
        skipped_rows: row.get(7)?,
        error_count: row.get(8)?,
        imported_by: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

pub fn insert(conn: &Connection, run: &NewImportRun<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO import_runs
            (kind, filename, checksum, total_rows, matched_rows, unmatched_rows,
             skipped_rows, error_count, imported_by, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run.kind.as_str(),
            run.filename,
            run.checksum,
            run.total_rows,
            run.matched_rows,
            run.unmatched_rows,
            run.skipped_rows,
            run.error_count,
            run.imported_by,
            run.started_at,
            run.completed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every run, newest first.
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<ImportRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, filename, checksum, total_rows, matched_rows, unmatched_rows,
                skipped_rows, error_count, imported_by, started_at, completed_at
         FROM import_runs ORDER BY started_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], map_run)?;
    rows.collect()
}
