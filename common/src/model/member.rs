use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The authoritative member record, keyed case-insensitively by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMember {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub tier: String,
    pub tags: Vec<String>,
    pub lifetime_visits: i64,
    pub external_client_id: Option<String>,
    pub linked_emails: Vec<String>,
}

impl CanonicalMember {
    /// "first last", trimmed. Empty when neither part is known.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// How a reviewer closed a tier conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Accepted,
    Ignored,
}

storage_str!(ConflictStatus, "conflict status" {
    Open => "open",
    Resolved => "resolved",
});

storage_str!(ConflictResolution, "conflict resolution" {
    Accepted => "accepted",
    Ignored => "ignored",
});

/// Name of the member as the import saw it when the conflict was last refreshed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictMetadata {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A stored tier that disagrees with the tier an external import reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConflict {
    pub id: i64,
    pub email: String,
    pub external_client_id: Option<String>,
    pub current_tier: String,
    pub incoming_tier: String,
    pub source: String,
    pub status: ConflictStatus,
    pub resolution: Option<ConflictResolution>,
    pub metadata: ConflictMetadata,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
