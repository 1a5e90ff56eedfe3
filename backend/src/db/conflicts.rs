use super::{json_column, parse_column, to_json};
use chrono::NaiveDateTime;
use club_common::model::member::{ConflictMetadata, ConflictResolution, TierConflict};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CONFLICT_COLUMNS: &str = "id, email, external_client_id, current_tier, incoming_tier, \
     source, status, resolution, metadata, resolved_by, resolved_at, created_at, updated_at";

fn map_conflict(row: &Row<'_>) -> rusqlite::Result<TierConflict> {
    let resolution: Option<String> = row.get(7)?;
    Ok(TierConflict {
        id: row.get(0)?,
        email: row.get(1)?,
        external_client_id: row.get(2)?,
        current_tier: row.get(3)?,
        incoming_tier: row.get(4)?,
        source: row.get(5)?,
        status: parse_column(row, 6)?,
        resolution: resolution
            .map(|r| r.parse::<ConflictResolution>())
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into())
            })?,
        metadata: json_column(row, 8)?,
        resolved_by: row.get(9)?,
        resolved_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Conflict details written by [`upsert_open`].
pub struct ConflictUpsert<'a> {
    pub email: &'a str,
    pub external_client_id: Option<&'a str>,
    pub current_tier: &'a str,
    pub incoming_tier: &'a str,
    pub source: &'a str,
    pub metadata: &'a ConflictMetadata,
    pub now: NaiveDateTime,
}

/// Inserts the open conflict for (email, source) or refreshes the one that is
/// already open, in one statement. The partial unique index on open conflicts
/// is the arbiter, so two writers can never end up with two open rows.
pub fn upsert_open(conn: &Connection, conflict: &ConflictUpsert<'_>) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO tier_conflicts
            (email, external_client_id, current_tier, incoming_tier, source, status,
             metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?7, ?7)
         ON CONFLICT (email, source) WHERE status = 'open' DO UPDATE SET
            current_tier = excluded.current_tier,
            incoming_tier = excluded.incoming_tier,
            metadata = excluded.metadata,
            external_client_id = COALESCE(excluded.external_client_id, tier_conflicts.external_client_id),
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            conflict.email,
            conflict.external_client_id,
            conflict.current_tier,
            conflict.incoming_tier,
            conflict.source,
            to_json(conflict.metadata)?,
            conflict.now,
        ],
        |row| row.get(0),
    )
}

/// Open conflicts, newest first.
pub fn list_open(conn: &Connection) -> rusqlite::Result<Vec<TierConflict>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tier_conflicts WHERE status = 'open' ORDER BY created_at DESC, id DESC",
        CONFLICT_COLUMNS
    ))?;
    let rows = stmt.query_map([], map_conflict)?;
    rows.collect()
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<TierConflict>> {
    conn.query_row(
        &format!("SELECT {} FROM tier_conflicts WHERE id = ?1", CONFLICT_COLUMNS),
        params![id],
        map_conflict,
    )
    .optional()
}

pub fn open_for(conn: &Connection, email: &str, source: &str) -> rusqlite::Result<Vec<TierConflict>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tier_conflicts WHERE email = ?1 AND source = ?2 AND status = 'open'",
        CONFLICT_COLUMNS
    ))?;
    let rows = stmt.query_map(params![email, source], map_conflict)?;
    rows.collect()
}

/// Closes an open conflict. Returns `false` when it was not open.
pub fn close(
    conn: &Connection,
    id: i64,
    resolution: ConflictResolution,
    resolved_by: &str,
    now: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE tier_conflicts
         SET status = 'resolved', resolution = ?1, resolved_by = ?2, resolved_at = ?3, updated_at = ?3
         WHERE id = ?4 AND status = 'open'",
        params![resolution.as_str(), resolved_by, now, id],
    )?;
    Ok(changed == 1)
}
