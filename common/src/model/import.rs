use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which pipeline produced an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Bookings,
    Members,
}

storage_str!(ImportKind, "import kind" {
    Bookings => "bookings",
    Members => "members",
});

/// One entry of the append-only import ledger.
///
/// For member directory runs `matched_rows` counts updated members and
/// `unmatched_rows` counts newly created ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: i64,
    pub kind: ImportKind,
    pub filename: String,
    pub checksum: String,
    pub total_rows: u32,
    pub matched_rows: u32,
    pub unmatched_rows: u32,
    pub skipped_rows: u32,
    pub error_count: u32,
    pub imported_by: String,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
}

/// Aggregate outcome of a booking import, returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: u32,
    pub matched_rows: u32,
    pub unmatched_rows: u32,
    pub skipped_rows: u32,
    pub errors: Vec<String>,
}

/// Aggregate outcome of a member directory import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberImportSummary {
    pub total_rows: u32,
    pub created: u32,
    pub updated: u32,
    pub conflicts: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Result of resolving an unmatched booking.
///
/// `resolved_count` includes the explicitly resolved record;
/// `auto_resolved_count` only the siblings resolved by propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub resolved: bool,
    pub resolved_count: u32,
    pub auto_resolved_count: u32,
}
