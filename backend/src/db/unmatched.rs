use super::parse_column;
use crate::reconcile::ingest::ExternalBookingRecord;
use chrono::NaiveDateTime;
use club_common::model::booking::{BookingStatus, MatchFailure, UnmatchedBooking};
use rusqlite::{params, Connection, OptionalExtension, Row};

const UNMATCHED_COLUMNS: &str = "id, external_id, raw_name, raw_email, date, start_time, end_time, \
     duration_minutes, status, resource_id, party_size, notes, booked_at, failure_reason, \
     resolved_email, resolved_by, resolved_at";

fn map_unmatched(row: &Row<'_>) -> rusqlite::Result<UnmatchedBooking> {
    Ok(UnmatchedBooking {
        id: row.get(0)?,
        external_id: row.get(1)?,
        raw_name: row.get(2)?,
        raw_email: row.get(3)?,
        date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        duration_minutes: row.get(7)?,
        status: parse_column(row, 8)?,
        resource_id: row.get(9)?,
        party_size: row.get(10)?,
        notes: row.get(11)?,
        booked_at: row.get(12)?,
        failure_reason: parse_column(row, 13)?,
        resolved_email: row.get(14)?,
        resolved_by: row.get(15)?,
        resolved_at: row.get(16)?,
    })
}

pub fn insert(
    conn: &Connection,
    record: &ExternalBookingRecord,
    status: BookingStatus,
    failure: MatchFailure,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO unmatched_bookings
            (external_id, raw_name, raw_email, date, start_time, end_time, duration_minutes,
             status, resource_id, party_size, notes, booked_at, failure_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.external_id,
            record.raw_name,
            record.raw_email,
            record.start_at.date(),
            record.start_at.time(),
            record.end_at.time(),
            record.duration_minutes,
            status.as_str(),
            record.resource_id,
            record.party_size,
            record.notes,
            record.booked_at,
            failure.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn exists_for_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM unmatched_bookings WHERE external_id = ?1)",
        params![external_id],
        |row| row.get(0),
    )
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<UnmatchedBooking>> {
    conn.query_row(
        &format!("SELECT {} FROM unmatched_bookings WHERE id = ?1", UNMATCHED_COLUMNS),
        params![id],
        map_unmatched,
    )
    .optional()
}

/// Page of unmatched bookings, latest booking date first. `resolved` narrows
/// to one state; `None` lists both.
pub fn list(
    conn: &Connection,
    resolved: Option<bool>,
    limit: u32,
    offset: u32,
) -> rusqlite::Result<Vec<UnmatchedBooking>> {
    let filter = match resolved {
        Some(true) => "WHERE resolved_email IS NOT NULL",
        Some(false) => "WHERE resolved_email IS NULL",
        None => "",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM unmatched_bookings {} ORDER BY date DESC, start_time DESC, id DESC
         LIMIT ?1 OFFSET ?2",
        UNMATCHED_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(params![limit, offset], map_unmatched)?;
    rows.collect()
}

/// Pending records other than `exclude_id` whose raw email equals `raw_email` exactly.
pub fn pending_with_raw_email(
    conn: &Connection,
    raw_email: &str,
    exclude_id: i64,
) -> rusqlite::Result<Vec<UnmatchedBooking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM unmatched_bookings
         WHERE raw_email = ?1 AND id <> ?2 AND resolved_email IS NULL
         ORDER BY id",
        UNMATCHED_COLUMNS
    ))?;
    let rows = stmt.query_map(params![raw_email, exclude_id], map_unmatched)?;
    rows.collect()
}

/// Moves a record from pending to resolved. Already resolved records are left
/// untouched and `false` is returned.
pub fn mark_resolved(
    conn: &Connection,
    id: i64,
    email: &str,
    resolved_by: &str,
    resolved_at: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE unmatched_bookings
         SET resolved_email = ?1, resolved_by = ?2, resolved_at = ?3
         WHERE id = ?4 AND resolved_email IS NULL",
        params![email, resolved_by, resolved_at, id],
    )?;
    Ok(changed == 1)
}
