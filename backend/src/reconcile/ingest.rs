//! Booking export ingestion.
//!
//! Turns delimited text into typed [`ExternalBookingRecord`]s in file order.
//! A row that does not fit the column schema becomes a `MalformedRow` error
//! for that row only; the remaining rows are still returned.

use crate::error::{ReconcileError, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

/// Number of columns the booking export schema defines. Extra columns are ignored.
pub const BOOKING_COLUMNS: usize = 11;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// One booking row of a third-party export, validated against the column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalBookingRecord {
    pub external_id: String,
    pub raw_name: String,
    pub raw_email: String,
    pub booked_at: Option<NaiveDateTime>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub duration_minutes: i64,
    pub raw_status: String,
    pub resource_id: Option<String>,
    pub party_size: i64,
    pub notes: String,
}

/// A data row together with the physical line it started on.
#[derive(Debug)]
pub struct IngestedRow {
    pub line: u64,
    pub record: Result<ExternalBookingRecord>,
}

/// The parsed content of a source file plus the MD5 of its bytes.
#[derive(Debug)]
pub struct IngestedFile {
    pub rows: Vec<IngestedRow>,
    pub checksum: String,
}

pub fn read_booking_file(path: &Path) -> Result<IngestedFile> {
    let bytes = std::fs::read(path)?;
    let checksum = format!("{:x}", md5::compute(&bytes));
    let rows = read_booking_rows(bytes.as_slice())?;
    Ok(IngestedFile { rows, checksum })
}

/// Parses a booking export. The first non-blank record is the header.
pub fn read_booking_rows<R: Read>(input: R) -> Result<Vec<IngestedRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let mut rows = Vec::new();
    let mut header_seen = false;
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                rows.push(IngestedRow {
                    line,
                    record: Err(ReconcileError::MalformedRow {
                        line,
                        reason: err.to_string(),
                    }),
                });
                continue;
            }
        };
        if is_blank(&record) {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        rows.push(IngestedRow {
            line,
            record: parse_booking_record(line, &record),
        });
    }
    Ok(rows)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn parse_booking_record(line: u64, record: &StringRecord) -> Result<ExternalBookingRecord> {
    let malformed = |reason: String| ReconcileError::MalformedRow { line, reason };

    if record.len() < BOOKING_COLUMNS {
        return Err(malformed(format!(
            "expected {} fields, found {}",
            BOOKING_COLUMNS,
            record.len()
        )));
    }
    let field = |idx: usize| record.get(idx).unwrap_or_default().trim();

    let external_id = field(0);
    if external_id.is_empty() {
        return Err(malformed("missing external booking id".to_string()));
    }

    let start_at = parse_datetime(field(4))
        .ok_or_else(|| malformed(format!("invalid start time '{}'", field(4))))?;
    let end_at = parse_datetime(field(5))
        .ok_or_else(|| malformed(format!("invalid end time '{}'", field(5))))?;

    let duration_minutes = match field(6) {
        "" => (end_at - start_at).num_minutes(),
        raw => raw
            .parse::<i64>()
            .map_err(|_| malformed(format!("invalid duration '{}'", raw)))?,
    };
    let party_size = match field(9) {
        "" => 1,
        raw => raw
            .parse::<i64>()
            .map_err(|_| malformed(format!("invalid party size '{}'", raw)))?,
    };

    Ok(ExternalBookingRecord {
        external_id: external_id.to_string(),
        raw_name: field(1).to_string(),
        raw_email: field(2).to_string(),
        booked_at: parse_datetime(field(3)),
        start_at,
        end_at,
        duration_minutes,
        raw_status: field(7).to_string(),
        resource_id: Some(field(8)).filter(|s| !s.is_empty()).map(str::to_string),
        party_size,
        notes: field(10).to_string(),
    })
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
