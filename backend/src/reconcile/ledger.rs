//! Append-only audit log of import runs.

use crate::db::import_runs::{self, NewImportRun};
use crate::error::Result;
use chrono::{NaiveDateTime, Utc};
use club_common::model::import::{ImportKind, ImportRun, ImportSummary, MemberImportSummary};
use rusqlite::Connection;

/// Where a run's rows came from and who started it.
pub struct RunSource<'a> {
    pub filename: &'a str,
    pub checksum: &'a str,
    pub imported_by: &'a str,
    pub started_at: NaiveDateTime,
}

pub fn record_booking_run(
    conn: &Connection,
    source: &RunSource<'_>,
    summary: &ImportSummary,
) -> Result<i64> {
    Ok(import_runs::insert(
        conn,
        &NewImportRun {
            kind: ImportKind::Bookings,
            filename: source.filename,
            checksum: source.checksum,
            total_rows: summary.total_rows,
            matched_rows: summary.matched_rows,
            unmatched_rows: summary.unmatched_rows,
            skipped_rows: summary.skipped_rows,
            error_count: summary.errors.len() as u32,
            imported_by: source.imported_by,
            started_at: source.started_at,
            completed_at: Utc::now().naive_utc(),
        },
    )?)
}

/// Member runs reuse the ledger columns: updated members count as matched,
/// created members as unmatched.
pub fn record_member_run(
    conn: &Connection,
    source: &RunSource<'_>,
    summary: &MemberImportSummary,
) -> Result<i64> {
    Ok(import_runs::insert(
        conn,
        &NewImportRun {
            kind: ImportKind::Members,
            filename: source.filename,
            checksum: source.checksum,
            total_rows: summary.total_rows,
            matched_rows: summary.updated,
            unmatched_rows: summary.created,
            skipped_rows: summary.skipped,
            error_count: summary.errors.len() as u32,
            imported_by: source.imported_by,
            started_at: source.started_at,
            completed_at: Utc::now().naive_utc(),
        },
    )?)
}

/// All runs, newest first.
pub fn list_import_runs(conn: &Connection) -> Result<Vec<ImportRun>> {
    Ok(import_runs::list(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::Duration;

    #[test]
    fn runs_list_newest_first() {
        let conn = open_in_memory().unwrap();
        let t0 = Utc::now().naive_utc();
        let summary = ImportSummary {
            total_rows: 3,
            matched_rows: 1,
            unmatched_rows: 1,
            skipped_rows: 1,
            errors: vec!["Row 4: Unknown status \"Pending\"".into()],
        };
        for (name, offset) in [("older.csv", 0), ("newer.csv", 10)] {
            record_booking_run(
                &conn,
                &RunSource {
                    filename: name,
                    checksum: "abc",
                    imported_by: "admin",
                    started_at: t0 + Duration::seconds(offset),
                },
                &summary,
            )
            .unwrap();
        }
        record_member_run(
            &conn,
            &RunSource {
                filename: "members.csv",
                checksum: "def",
                imported_by: "admin",
                started_at: t0 - Duration::seconds(10),
            },
            &MemberImportSummary {
                total_rows: 2,
                created: 1,
                updated: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let runs = list_import_runs(&conn).unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["newer.csv", "older.csv", "members.csv"]);
        assert_eq!(runs[0].error_count, 1);
        assert_eq!(runs[0].kind, ImportKind::Bookings);
        assert_eq!(runs[2].kind, ImportKind::Members);
        assert_eq!(runs[2].unmatched_rows, 1);
    }
}
