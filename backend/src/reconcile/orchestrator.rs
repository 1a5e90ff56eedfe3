//! Booking import: ingests an export, matches every row against a member
//! snapshot, and writes either a booking or an unmatched record per row.
//!
//! Rows run strictly in file order, one IMMEDIATE transaction each. A failing
//! row lands in the run's error list and counts as skipped; it never stops the
//! rows after it. Every run that gets as far as reading its file ends with one
//! ledger entry.

use super::ingest::{self, ExternalBookingRecord, IngestedFile};
use super::ledger::{self, RunSource};
use super::matcher::{IdentityMatcher, MatchOutcome, MatchPolicy, MatchStrategy, MemberSnapshot};
use super::consume_upload;
use crate::db::{self, bookings, members, unmatched};
use crate::error::{ReconcileError, Result};
use chrono::Utc;
use club_common::model::booking::{BookingStatus, MatchFailure};
use club_common::model::import::ImportSummary;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use tempfile::NamedTempFile;

/// What happened to one row that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Matched {
        email: String,
        strategy: MatchStrategy,
    },
    Unmatched(MatchFailure),
    Cancelled,
    /// The external id was already imported by an earlier run.
    Duplicate,
}

/// Imports a booking export that already sits on disk.
pub fn import_from_path(
    conn: &mut Connection,
    path: &Path,
    imported_by: &str,
    policy: &MatchPolicy,
) -> Result<ImportSummary> {
    let file = ingest::read_booking_file(path)?;
    let filename = display_name(path);
    run_import(conn, file, &filename, imported_by, policy)
}

/// Imports an uploaded export. The upload is deleted on every exit path.
pub fn import_from_upload(
    conn: &mut Connection,
    upload: NamedTempFile,
    filename: &str,
    imported_by: &str,
    policy: &MatchPolicy,
) -> Result<ImportSummary> {
    consume_upload(upload, |path| {
        let file = ingest::read_booking_file(path)?;
        run_import(conn, file, filename, imported_by, policy)
    })
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Processes every ingested row and appends the run to the ledger.
pub fn run_import(
    conn: &mut Connection,
    file: IngestedFile,
    filename: &str,
    imported_by: &str,
    policy: &MatchPolicy,
) -> Result<ImportSummary> {
    let started_at = Utc::now().naive_utc();
    let matcher = IdentityMatcher::new(MemberSnapshot::load(conn)?, policy.clone());
    info!(
        "Booking import of {} started by {}: {} rows, {} members in snapshot",
        filename,
        imported_by,
        file.rows.len(),
        matcher.snapshot().member_count()
    );

    let mut summary = ImportSummary {
        total_rows: file.rows.len() as u32,
        ..Default::default()
    };
    for row in file.rows {
        let outcome = row
            .record
            .and_then(|record| process_row(conn, &matcher, row.line, &record));
        tally(&mut summary, outcome);
    }

    ledger::record_booking_run(
        conn,
        &RunSource {
            filename,
            checksum: &file.checksum,
            imported_by,
            started_at,
        },
        &summary,
    )?;
    info!(
        "Booking import of {} finished: matched={}, unmatched={}, skipped={}, errors={}",
        filename,
        summary.matched_rows,
        summary.unmatched_rows,
        summary.skipped_rows,
        summary.errors.len()
    );
    Ok(summary)
}

fn tally(summary: &mut ImportSummary, outcome: Result<RowOutcome>) {
    match outcome {
        Ok(RowOutcome::Matched { .. }) => summary.matched_rows += 1,
        Ok(RowOutcome::Unmatched(_)) => summary.unmatched_rows += 1,
        Ok(RowOutcome::Cancelled) | Ok(RowOutcome::Duplicate) => summary.skipped_rows += 1,
        Err(e) => {
            match &e {
                ReconcileError::Storage(_) => error!("{}", e),
                _ => warn!("{}", e),
            }
            summary.skipped_rows += 1;
            summary.errors.push(e.to_string());
        }
    }
}

/// Reconciles one external booking. All writes of the row commit together.
pub fn process_row(
    conn: &mut Connection,
    matcher: &IdentityMatcher,
    line: u64,
    record: &ExternalBookingRecord,
) -> Result<RowOutcome> {
    let status = match BookingStatus::normalize(&record.raw_status) {
        Some(BookingStatus::Cancelled) => return Ok(RowOutcome::Cancelled),
        Some(status) => status,
        None => {
            return Err(ReconcileError::UnknownStatus {
                line,
                status: record.raw_status.clone(),
            })
        }
    };

    let tx = db::write_transaction(conn)?;
    if bookings::exists_for_external_id(&tx, &record.external_id)?
        || unmatched::exists_for_external_id(&tx, &record.external_id)?
    {
        debug!("Row {}: {} already imported", line, record.external_id);
        return Ok(RowOutcome::Duplicate);
    }

    let outcome = match matcher.match_identity(&record.raw_name, &record.raw_email) {
        MatchOutcome::Matched { email, strategy } => {
            debug!("Row {}: {} matched {} by {}", line, record.external_id, email, strategy);
            create_booking(
                &tx,
                &bookings::NewBooking {
                    external_id: &record.external_id,
                    member_email: &email,
                    member_name: &record.raw_name,
                    resource_id: record.resource_id.as_deref(),
                    date: record.start_at.date(),
                    start_time: record.start_at.time(),
                    end_time: record.end_at.time(),
                    duration_minutes: record.duration_minutes,
                    party_size: record.party_size,
                    status,
                    notes: &record.notes,
                    booked_at: record.booked_at,
                    match_strategy: &strategy.to_string(),
                },
            )?;
            RowOutcome::Matched { email, strategy }
        }
        MatchOutcome::Unmatched(failure) => {
            debug!("Row {}: {} unmatched ({})", line, record.external_id, failure);
            unmatched::insert(&tx, record, status, failure)?;
            RowOutcome::Unmatched(failure)
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// Writes a booking and, for attended bookings, counts the visit. Shared by
/// imports and by unmatched resolution so both apply the same visit rule.
pub(crate) fn create_booking(conn: &Connection, booking: &bookings::NewBooking<'_>) -> Result<i64> {
    let id = bookings::insert(conn, booking)?;
    if booking.status == BookingStatus::Attended {
        members::increment_visits(conn, booking.member_email)?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members::tests::member;
    use crate::db::open_in_memory;

    const HEADER: &str = "id,name,email,booked,start,end,duration,status,resource,party,notes\n";

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        members::insert(&conn, &member("jane@realmail.com", "Jane", "Smith", "Core")).unwrap();
        conn
    }

    fn run(conn: &mut Connection, body: &str) -> ImportSummary {
        let input = format!("{}{}", HEADER, body);
        let file = IngestedFile {
            rows: ingest::read_booking_rows(input.as_bytes()).unwrap(),
            checksum: format!("{:x}", md5::compute(input.as_bytes())),
        };
        run_import(conn, file, "bookings.csv", "admin", &MatchPolicy::default()).unwrap()
    }

    fn visits(conn: &Connection) -> i64 {
        members::find_by_email(conn, "jane@realmail.com")
            .unwrap()
            .unwrap()
            .lifetime_visits
    }

    #[test]
    fn matched_attended_row_books_and_counts_a_visit() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK1001,Jane Smith,anonymous@yourgolfbooking.com,2024-01-01 08:00,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,2,\n",
        );
        assert_eq!(summary.matched_rows, 1);
        assert_eq!(visits(&conn), 1);
        let booking = bookings::find_by_external_id(&conn, "BK1001").unwrap().unwrap();
        assert_eq!(booking.member_email, "jane@realmail.com");
        assert_eq!(booking.match_strategy, "name");
    }

    #[test]
    fn no_show_is_booked_without_a_visit() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK1,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,No_Show,,1,\n",
        );
        assert_eq!(summary.matched_rows, 1);
        assert_eq!(visits(&conn), 0);
    }

    #[test]
    fn cancelled_rows_are_skipped_without_writes() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK1,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,CANCELLED,,1,\n\
             BK2,Nobody,nobody@x.test,,2024-01-02 09:00,2024-01-02 10:00,60,canceled,,1,\n",
        );
        assert_eq!(summary.skipped_rows, 2);
        assert!(summary.errors.is_empty());
        assert!(!bookings::exists_for_external_id(&conn, "BK1").unwrap());
        assert!(!unmatched::exists_for_external_id(&conn, "BK2").unwrap());
    }

    #[test]
    fn unknown_status_is_reported_and_skipped() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK1,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Pending,,1,\n",
        );
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(summary.errors, vec!["Row 2: Unknown status \"Pending\"".to_string()]);
        assert!(!bookings::exists_for_external_id(&conn, "BK1").unwrap());
    }

    #[test]
    fn unmatched_rows_keep_their_failure_reason() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK9,Ghost Golfer,anonymous@yourgolfbooking.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,4,1,late\n",
        );
        assert_eq!(summary.unmatched_rows, 1);
        let stored = unmatched::list(&conn, Some(false), 10, 0).unwrap();
        assert_eq!(stored[0].failure_reason, MatchFailure::PlaceholderEmail);
        assert_eq!(stored[0].resource_id.as_deref(), Some("4"));
        assert_eq!(stored[0].notes, "late");
    }

    #[test]
    fn reimport_is_idempotent() {
        let mut conn = seeded();
        let body = "BK1,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n\
                    BK2,Ghost Golfer,ghost@x.test,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n";
        let first = run(&mut conn, body);
        assert_eq!((first.matched_rows, first.unmatched_rows), (1, 1));
        let second = run(&mut conn, body);
        assert_eq!((second.matched_rows, second.unmatched_rows), (0, 0));
        assert_eq!(second.skipped_rows, 2);
        assert!(second.errors.is_empty());
        assert_eq!(visits(&conn), 1);
        assert_eq!(ledger::list_import_runs(&conn).unwrap().len(), 2);
    }

    #[test]
    fn marker_text_in_notes_does_not_shadow_a_later_row() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK2,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,rebooked from [Booking Import ID:BK1]\n\
             BK1,Jane Smith,jane@realmail.com,,2024-01-03 09:00,2024-01-03 10:00,60,Attended,,1,\n",
        );
        assert_eq!(summary.matched_rows, 2);
        assert_eq!(summary.skipped_rows, 0);
        assert_eq!(visits(&conn), 2);
        assert!(bookings::exists_for_external_id(&conn, "BK1").unwrap());
    }

    #[test]
    fn malformed_rows_do_not_abort_the_batch() {
        let mut conn = seeded();
        let summary = run(
            &mut conn,
            "BK1,Jane Smith\n\
             BK2,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n",
        );
        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.matched_rows, 1);
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Row 2: malformed row"));
    }

    #[test]
    fn storage_failure_on_one_row_is_isolated() {
        let mut conn = seeded();
        // Any insert into unmatched_bookings fails; bookings still work.
        conn.execute_batch(
            "CREATE TRIGGER reject_unmatched BEFORE INSERT ON unmatched_bookings
             BEGIN SELECT RAISE(ABORT, 'disk says no'); END;",
        )
        .unwrap();
        let summary = run(
            &mut conn,
            "BK1,Ghost Golfer,ghost@x.test,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n\
             BK2,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n",
        );
        assert_eq!(summary.matched_rows, 1);
        assert_eq!(summary.skipped_rows, 1);
        assert!(summary.errors[0].contains("disk says no"));
        assert_eq!(ledger::list_import_runs(&conn).unwrap().len(), 1);
    }

    #[test]
    fn upload_file_is_removed_after_import() {
        let mut conn = seeded();
        let mut upload = NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut upload,
            format!(
                "{}BK1,Jane Smith,jane@realmail.com,,2024-01-02 09:00,2024-01-02 10:00,60,Attended,,1,\n",
                HEADER
            )
            .as_bytes(),
        )
        .unwrap();
        let path = upload.path().to_path_buf();
        let summary = import_from_upload(
            &mut conn,
            upload,
            "export.csv",
            "admin",
            &MatchPolicy::default(),
        )
        .unwrap();
        assert_eq!(summary.matched_rows, 1);
        assert!(!path.exists());
        let runs = ledger::list_import_runs(&conn).unwrap();
        assert_eq!(runs[0].filename, "export.csv");
    }
}
