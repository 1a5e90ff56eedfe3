use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// The booking status taxonomy. Every imported row is normalized into one of
/// these three values or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Attended,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Maps a raw status string from a booking-platform export onto the
    /// taxonomy. Returns `None` for anything the taxonomy does not cover.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "attended" | "confirmed" => Some(Self::Attended),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "no_show" | "noshow" | "no-show" | "no show" => Some(Self::NoShow),
            _ => None,
        }
    }
}

storage_str!(BookingStatus, "booking status" {
    Attended => "attended",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

/// A booking attributed to a canonical member.
///
/// `notes` starts with the import marker of the external booking it came
/// from. `match_strategy` records how the member was identified (`email`,
/// `name`, `manual`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: i64,
    pub member_email: String,
    pub member_name: String,
    pub resource_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub party_size: i64,
    pub status: BookingStatus,
    pub notes: String,
    pub booked_at: Option<NaiveDateTime>,
    pub match_strategy: String,
}

/// Why the identity matcher could not attribute a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchFailure {
    PlaceholderEmail,
    EmailNotFound,
    NameNotFound,
}

storage_str!(MatchFailure, "match failure" {
    PlaceholderEmail => "placeholder-email",
    EmailNotFound => "email-not-found",
    NameNotFound => "name-not-found",
});

/// An external booking that could not be attributed to a member.
///
/// Pending while `resolved_email` is `None`. Once resolved, the resolution
/// fields never change again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedBooking {
    pub id: i64,
    pub external_id: String,
    pub raw_name: String,
    pub raw_email: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub resource_id: Option<String>,
    pub party_size: i64,
    pub notes: String,
    pub booked_at: Option<NaiveDateTime>,
    pub failure_reason: MatchFailure,
    pub resolved_email: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
}

impl UnmatchedBooking {
    pub fn is_pending(&self) -> bool {
        self.resolved_email.is_none()
    }
}
