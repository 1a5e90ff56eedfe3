use super::parse_column;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use club_common::model::booking::{BookingRecord, BookingStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Prefix of the marker every imported booking carries in its notes.
const IMPORT_MARKER_PREFIX: &str = "[Booking Import ID:";

/// Audit marker written at the head of an imported booking's notes.
/// Idempotency is keyed on the `external_id` column, never on this text.
pub fn import_marker(external_id: &str) -> String {
    format!("{}{}]", IMPORT_MARKER_PREFIX, external_id)
}

/// Fields of a booking about to be written.
pub struct NewBooking<'a> {
    pub external_id: &'a str,
    pub member_email: &'a str,
    pub member_name: &'a str,
    pub resource_id: Option<&'a str>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub party_size: i64,
    pub status: BookingStatus,
    pub notes: &'a str,
    pub booked_at: Option<NaiveDateTime>,
    pub match_strategy: &'a str,
}

const BOOKING_COLUMNS: &str = "id, member_email, member_name, resource_id, date, start_time, \
     end_time, duration_minutes, party_size, status, notes, booked_at, match_strategy";

fn map_booking(row: &Row<'_>) -> rusqlite::Result<BookingRecord> {
    Ok(BookingRecord {
        id: row.get(0)?,
        member_email: row.get(1)?,
        member_name: row.get(2)?,
        resource_id: row.get(3)?,
        date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        duration_minutes: row.get(7)?,
        party_size: row.get(8)?,
        status: parse_column(row, 9)?,
        notes: row.get(10)?,
        booked_at: row.get(11)?,
        match_strategy: row.get(12)?,
    })
}

pub fn insert(conn: &Connection, booking: &NewBooking<'_>) -> rusqlite::Result<i64> {
    let notes = format!("{} {}", import_marker(booking.external_id), booking.notes.trim());
    conn.execute(
        "INSERT INTO booking_records
            (member_email, member_name, resource_id, date, start_time, end_time,
             duration_minutes, party_size, status, notes, booked_at, match_strategy,
             external_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.member_email,
            booking.member_name,
            booking.resource_id,
            booking.date,
            booking.start_time,
            booking.end_time,
            booking.duration_minutes,
            booking.party_size,
            booking.status.as_str(),
            notes.trim_end(),
            booking.booked_at,
            booking.match_strategy,
            booking.external_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Whether a booking was already imported for `external_id`.
pub fn exists_for_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM booking_records WHERE external_id = ?1)",
        params![external_id],
        |row| row.get(0),
    )
}

pub fn find_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> rusqlite::Result<Option<BookingRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM booking_records WHERE external_id = ?1",
            BOOKING_COLUMNS
        ),
        params![external_id],
        map_booking,
    )
    .optional()
}

/// Bookings of one member, oldest slot first.
pub fn list_for_member(conn: &Connection, email: &str) -> rusqlite::Result<Vec<BookingRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM booking_records WHERE member_email = ?1 ORDER BY date, start_time, id",
        BOOKING_COLUMNS
    ))?;
    let rows = stmt.query_map(params![email.trim()], map_booking)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn booking<'a>(external_id: &'a str) -> NewBooking<'a> {
        NewBooking {
            external_id,
            member_email: "jane@realmail.com",
            member_name: "Jane Smith",
            resource_id: Some("3"),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_minutes: 60,
            party_size: 2,
            status: BookingStatus::Attended,
            notes: "bring clubs",
            booked_at: None,
            match_strategy: "email",
        }
    }

    #[test]
    fn marker_probe_is_exact() {
        let conn = open_in_memory().unwrap();
        insert(&conn, &booking("BK1001")).unwrap();
        assert!(exists_for_external_id(&conn, "BK1001").unwrap());
        assert!(!exists_for_external_id(&conn, "BK100").unwrap());
        assert!(!exists_for_external_id(&conn, "BK10011").unwrap());
    }

    #[test]
    fn marker_text_in_notes_does_not_count_as_an_import() {
        let conn = open_in_memory().unwrap();
        let mut rebooked = booking("BK2");
        rebooked.notes = "rebooked from [Booking Import ID:BK1]";
        insert(&conn, &rebooked).unwrap();
        insert(&conn, &booking("BK1] x")).unwrap();
        assert!(!exists_for_external_id(&conn, "BK1").unwrap());

        insert(&conn, &booking("BK1")).unwrap();
        assert!(exists_for_external_id(&conn, "BK1").unwrap());
        let stored = find_by_external_id(&conn, "BK1").unwrap().unwrap();
        assert_eq!(stored.notes, "[Booking Import ID:BK1] bring clubs");
    }

    #[test]
    fn stored_booking_reads_back() {
        let conn = open_in_memory().unwrap();
        insert(&conn, &booking("BK7")).unwrap();
        let stored = find_by_external_id(&conn, "BK7").unwrap().unwrap();
        assert_eq!(stored.notes, "[Booking Import ID:BK7] bring clubs");
        assert_eq!(stored.status, BookingStatus::Attended);
        assert_eq!(stored.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(list_for_member(&conn, "JANE@realmail.com").unwrap().len(), 1);
    }

    #[test]
    fn wildcard_characters_in_ids_are_literal() {
        let conn = open_in_memory().unwrap();
        insert(&conn, &booking("BK_1%")).unwrap();
        assert!(exists_for_external_id(&conn, "BK_1%").unwrap());
        assert!(!exists_for_external_id(&conn, "BKx1y").unwrap());
    }
}
