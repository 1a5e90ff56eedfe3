//! Member directory import and tier conflict detection.
//!
//! Contact fields, tags and linked emails from a directory export merge into
//! the member on every import. A differing tier is never applied directly:
//! it raises (or refreshes) the single open conflict for that member and
//! source, and the stored tier stays put until a reviewer accepts it.

use super::consume_upload;
use super::ledger::{self, RunSource};
use super::orchestrator::display_name;
use crate::db::conflicts::{self, ConflictUpsert};
use crate::db::{self, members};
use crate::error::{ReconcileError, Result};
use chrono::Utc;
use club_common::model::import::MemberImportSummary;
use club_common::model::member::{
    CanonicalMember, ConflictMetadata, ConflictResolution, ConflictStatus, TierConflict,
};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tempfile::NamedTempFile;

/// Membership plan names as the directory export spells them, mapped to a
/// tier and the tags that plan implies.
const PLAN_TABLE: &[(&str, &str, &[&str])] = &[
    ("Core Membership", "Core", &[]),
    ("Core Membership Founding Members", "Core", &["Founding Member"]),
    ("Premium Membership", "Premium", &[]),
    ("Premium Membership Founding Members", "Premium", &["Founding Member"]),
    ("VIP Membership", "VIP", &[]),
    ("Corporate Membership", "Corporate", &[]),
    ("Approved Pre Sale Clients", "Social", &["Pre-Sale"]),
    ("Social Membership", "Social", &[]),
    ("Social Membership Founding Members", "Social", &["Founding Member"]),
    ("Junior Group Lessons Membership", "Social", &["Junior Lessons"]),
    ("Group Lessons Membership", "Social", &["Group Lessons"]),
];

const DEFAULT_TIER: &str = "Guest";

/// Maps a plan name to (tier, tags). Unknown names are taken as the tier itself.
pub fn map_plan(plan: &str) -> (String, Vec<String>) {
    let plan = plan.trim();
    if plan.is_empty() {
        return (DEFAULT_TIER.to_string(), Vec::new());
    }
    match PLAN_TABLE
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(plan))
    {
        Some((_, tier, tags)) => (
            tier.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        ),
        None => {
            warn!("Unknown membership plan \"{}\", using it as the tier", plan);
            (plan.to_string(), Vec::new())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemberCsvRow {
    #[serde(alias = "real_email")]
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    #[serde(alias = "tier")]
    membership_tier: String,
    #[serde(alias = "mindbody_id")]
    external_client_id: String,
    #[serde(alias = "trackman_emails_linked")]
    linked_emails: String,
}

/// One directory entry, validated and with its plan already mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDirectoryRecord {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub tier: String,
    pub tags: Vec<String>,
    pub external_client_id: Option<String>,
    pub linked_emails: Vec<String>,
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl MemberDirectoryRecord {
    fn from_csv(line: u64, row: MemberCsvRow) -> Result<Self> {
        let email = row.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ReconcileError::MalformedRow {
                line,
                reason: "missing email".to_string(),
            });
        }
        let (tier, tags) = map_plan(&row.membership_tier);
        Ok(Self {
            email,
            first_name: non_empty(row.first_name),
            last_name: non_empty(row.last_name),
            phone: non_empty(row.phone),
            tier,
            tags,
            external_client_id: non_empty(row.external_client_id),
            linked_emails: row
                .linked_emails
                .split([';', ','])
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        })
    }
}

/// Parses a header-addressed directory export. Header names are matched
/// case-insensitively; unknown columns are ignored. An unreadable record
/// becomes a `MalformedRow` entry and reading continues.
pub fn read_member_rows<R: Read>(input: R) -> Vec<(u64, Result<MemberDirectoryRecord>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let mut header = StringRecord::new();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                let reason = err.to_string();
                rows.push((line, Err(ReconcileError::MalformedRow { line, reason })));
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if header.is_empty() {
            header = record.iter().map(|h| h.to_lowercase()).collect();
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let parsed = record
            .deserialize::<MemberCsvRow>(Some(&header))
            .map_err(|e| ReconcileError::MalformedRow {
                line,
                reason: e.to_string(),
            })
            .and_then(|row| MemberDirectoryRecord::from_csv(line, row));
        rows.push((line, parsed));
    }
    rows
}

/// What the detector decided for one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierCheck {
    /// No canonical member; nothing to compare against.
    NoMember,
    TierMatches,
    Conflict { conflict_id: i64 },
}

/// Compares the stored tier with the incoming one and upserts the open
/// conflict when they differ. Never touches the member's tier.
pub fn detect_tier_conflict(
    conn: &Connection,
    existing: Option<&CanonicalMember>,
    incoming: &MemberDirectoryRecord,
    source: &str,
) -> Result<TierCheck> {
    let Some(member) = existing else {
        return Ok(TierCheck::NoMember);
    };
    let current = member.tier.trim();
    if current.to_lowercase() == incoming.tier.trim().to_lowercase() {
        return Ok(TierCheck::TierMatches);
    }

    let metadata = ConflictMetadata {
        first_name: incoming
            .first_name
            .clone()
            .or_else(|| non_empty(member.first_name.clone())),
        last_name: incoming
            .last_name
            .clone()
            .or_else(|| non_empty(member.last_name.clone())),
    };
    let conflict_id = conflicts::upsert_open(
        conn,
        &ConflictUpsert {
            email: &member.email,
            external_client_id: incoming
                .external_client_id
                .as_deref()
                .or(member.external_client_id.as_deref()),
            current_tier: current,
            incoming_tier: incoming.tier.trim(),
            source,
            metadata: &metadata,
            now: Utc::now().naive_utc(),
        },
    )?;
    debug!(
        "Tier conflict {} for {}: {} -> {}",
        conflict_id, member.email, current, incoming.tier
    );
    Ok(TierCheck::Conflict { conflict_id })
}

/// Merges non-tier fields of `incoming` into `member`. Incoming contact
/// fields win when present; tags and linked emails are unioned in order.
pub fn merge_profile(member: &CanonicalMember, incoming: &MemberDirectoryRecord) -> CanonicalMember {
    let mut merged = member.clone();
    if let Some(first) = &incoming.first_name {
        merged.first_name = first.clone();
    }
    if let Some(last) = &incoming.last_name {
        merged.last_name = last.clone();
    }
    if incoming.phone.is_some() {
        merged.phone = incoming.phone.clone();
    }
    if incoming.external_client_id.is_some() {
        merged.external_client_id = incoming.external_client_id.clone();
    }
    for tag in &incoming.tags {
        if !merged.tags.contains(tag) {
            merged.tags.push(tag.clone());
        }
    }
    for alias in &incoming.linked_emails {
        if !alias.eq_ignore_ascii_case(&merged.email)
            && !merged.linked_emails.iter().any(|e| e.eq_ignore_ascii_case(alias))
        {
            merged.linked_emails.push(alias.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    Created,
    Updated { conflict: bool },
}

/// Applies one directory entry inside a single write transaction.
pub fn apply_member_record(
    conn: &mut Connection,
    incoming: &MemberDirectoryRecord,
    source: &str,
) -> Result<MemberOutcome> {
    let tx = db::write_transaction(conn)?;
    let existing = members::find_by_email_or_client_id(
        &tx,
        &incoming.email,
        incoming.external_client_id.as_deref(),
    )?;

    let outcome = match existing {
        None => {
            members::insert(
                &tx,
                &CanonicalMember {
                    email: incoming.email.clone(),
                    first_name: incoming.first_name.clone().unwrap_or_default(),
                    last_name: incoming.last_name.clone().unwrap_or_default(),
                    phone: incoming.phone.clone(),
                    tier: incoming.tier.clone(),
                    tags: incoming.tags.clone(),
                    lifetime_visits: 0,
                    external_client_id: incoming.external_client_id.clone(),
                    linked_emails: incoming.linked_emails.clone(),
                },
            )?;
            MemberOutcome::Created
        }
        Some((id, member)) => {
            members::update_profile(&tx, id, &merge_profile(&member, incoming))?;
            let check = detect_tier_conflict(&tx, Some(&member), incoming, source)?;
            MemberOutcome::Updated {
                conflict: matches!(check, TierCheck::Conflict { .. }),
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

pub fn import_members_from_path(
    conn: &mut Connection,
    path: &Path,
    imported_by: &str,
    source: &str,
) -> Result<MemberImportSummary> {
    let bytes = std::fs::read(path)?;
    run_member_import(conn, &bytes, &display_name(path), imported_by, source)
}

/// Imports an uploaded directory export. The upload is deleted on every exit path.
pub fn import_members_from_upload(
    conn: &mut Connection,
    upload: NamedTempFile,
    filename: &str,
    imported_by: &str,
    source: &str,
) -> Result<MemberImportSummary> {
    consume_upload(upload, |path| {
        let bytes = std::fs::read(path)?;
        run_member_import(conn, &bytes, filename, imported_by, source)
    })
}

fn run_member_import(
    conn: &mut Connection,
    bytes: &[u8],
    filename: &str,
    imported_by: &str,
    source: &str,
) -> Result<MemberImportSummary> {
    let started_at = Utc::now().naive_utc();
    let checksum = format!("{:x}", md5::compute(bytes));
    let rows = read_member_rows(bytes);
    info!(
        "Member import of {} started by {}: {} rows",
        filename,
        imported_by,
        rows.len()
    );

    let mut summary = MemberImportSummary {
        total_rows: rows.len() as u32,
        ..Default::default()
    };
    for (_, parsed) in rows {
        match parsed.and_then(|record| apply_member_record(conn, &record, source)) {
            Ok(MemberOutcome::Created) => summary.created += 1,
            Ok(MemberOutcome::Updated { conflict }) => {
                summary.updated += 1;
                if conflict {
                    summary.conflicts += 1;
                }
            }
            Err(e) => {
                warn!("{}", e);
                summary.skipped += 1;
                summary.errors.push(e.to_string());
            }
        }
    }

    ledger::record_member_run(
        conn,
        &RunSource {
            filename,
            checksum: &checksum,
            imported_by,
            started_at,
        },
        &summary,
    )?;
    info!(
        "Member import of {} finished: created={}, updated={}, conflicts={}, skipped={}",
        filename, summary.created, summary.updated, summary.conflicts, summary.skipped
    );
    Ok(summary)
}

/// Open conflicts, newest first.
pub fn list_open_conflicts(conn: &Connection) -> Result<Vec<TierConflict>> {
    Ok(conflicts::list_open(conn)?)
}

/// Applies the incoming tier of an open conflict to its member and closes it.
pub fn accept_conflict(conn: &mut Connection, conflict_id: i64, resolved_by: &str) -> Result<TierConflict> {
    close_conflict(conn, conflict_id, resolved_by, ConflictResolution::Accepted)
}

/// Closes an open conflict and leaves the member's tier as it is.
pub fn ignore_conflict(conn: &mut Connection, conflict_id: i64, resolved_by: &str) -> Result<TierConflict> {
    close_conflict(conn, conflict_id, resolved_by, ConflictResolution::Ignored)
}

fn close_conflict(
    conn: &mut Connection,
    conflict_id: i64,
    resolved_by: &str,
    resolution: ConflictResolution,
) -> Result<TierConflict> {
    let not_found = || ReconcileError::NotFound(format!("Open tier conflict {}", conflict_id));
    let tx = db::write_transaction(conn)?;
    let conflict = conflicts::get(&tx, conflict_id)?
        .filter(|c| c.status == ConflictStatus::Open)
        .ok_or_else(not_found)?;

    if resolution == ConflictResolution::Accepted
        && members::set_tier(&tx, &conflict.email, &conflict.incoming_tier)? == 0
    {
        return Err(ReconcileError::NotFound(format!("Member {}", conflict.email)));
    }
    if !conflicts::close(&tx, conflict_id, resolution, resolved_by, Utc::now().naive_utc())? {
        return Err(not_found());
    }
    let closed = conflicts::get(&tx, conflict_id)?.ok_or_else(not_found)?;
    tx.commit()?;

    info!(
        "Tier conflict {} for {} {} by {}",
        conflict_id, closed.email, resolution, resolved_by
    );
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members::tests::member;
    use crate::db::open_in_memory;

    const SOURCE: &str = "member_csv";

    fn record(email: &str, plan: &str) -> MemberDirectoryRecord {
        let (tier, tags) = map_plan(plan);
        MemberDirectoryRecord {
            email: email.into(),
            first_name: Some("Jane".into()),
            last_name: Some("Smith".into()),
            phone: None,
            tier,
            tags,
            external_client_id: None,
            linked_emails: vec![],
        }
    }

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        let mut jane = member("jane@realmail.com", "Jane", "Smith", "Core");
        jane.tags = vec!["Early Bird".into()];
        members::insert(&conn, &jane).unwrap();
        conn
    }

    #[test]
    fn plan_table_maps_tiers_and_tags() {
        assert_eq!(
            map_plan("Core Membership Founding Members"),
            ("Core".to_string(), vec!["Founding Member".to_string()])
        );
        assert_eq!(map_plan("vip membership").0, "VIP");
        assert_eq!(map_plan("Platinum").0, "Platinum");
        assert_eq!(map_plan("").0, "Guest");
    }

    #[test]
    fn absent_member_never_conflicts() {
        let conn = open_in_memory().unwrap();
        let check = detect_tier_conflict(&conn, None, &record("new@x.test", "VIP Membership"), SOURCE)
            .unwrap();
        assert_eq!(check, TierCheck::NoMember);
    }

    #[test]
    fn differing_tier_raises_conflict_and_keeps_stored_tier() {
        let mut conn = seeded();
        let mut incoming = record("jane@realmail.com", "Premium Membership Founding Members");
        incoming.phone = Some("555-0100".into());
        let outcome = apply_member_record(&mut conn, &incoming, SOURCE).unwrap();
        assert_eq!(outcome, MemberOutcome::Updated { conflict: true });

        let jane = members::find_by_email(&conn, "jane@realmail.com").unwrap().unwrap();
        assert_eq!(jane.tier, "Core");
        assert_eq!(jane.phone.as_deref(), Some("555-0100"));
        assert_eq!(jane.tags, vec!["Early Bird".to_string(), "Founding Member".to_string()]);

        let open = list_open_conflicts(&conn).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].current_tier, "Core");
        assert_eq!(open[0].incoming_tier, "Premium");
    }

    #[test]
    fn same_tier_in_other_case_is_not_a_conflict() {
        let mut conn = seeded();
        let mut incoming = record("jane@realmail.com", "");
        incoming.tier = "core".into();
        let outcome = apply_member_record(&mut conn, &incoming, SOURCE).unwrap();
        assert_eq!(outcome, MemberOutcome::Updated { conflict: false });
        assert!(list_open_conflicts(&conn).unwrap().is_empty());
    }

    #[test]
    fn repeated_conflicting_imports_coalesce() {
        let mut conn = seeded();
        apply_member_record(&mut conn, &record("jane@realmail.com", "VIP Membership"), SOURCE).unwrap();
        let mut again = record("jane@realmail.com", "VIP Membership");
        again.first_name = Some("Janet".into());
        apply_member_record(&mut conn, &again, SOURCE).unwrap();

        let open = list_open_conflicts(&conn).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].metadata.first_name.as_deref(), Some("Janet"));
    }

    #[test]
    fn member_is_found_by_external_client_id() {
        let mut conn = open_in_memory().unwrap();
        let mut jane = member("jane@realmail.com", "Jane", "Smith", "Core");
        jane.external_client_id = Some("MB-1".into());
        members::insert(&conn, &jane).unwrap();

        let mut incoming = record("jane.new@realmail.com", "Social Membership");
        incoming.external_client_id = Some("MB-1".into());
        let outcome = apply_member_record(&mut conn, &incoming, SOURCE).unwrap();
        assert_eq!(outcome, MemberOutcome::Updated { conflict: true });
        assert_eq!(list_open_conflicts(&conn).unwrap()[0].email, "jane@realmail.com");
    }

    #[test]
    fn accept_applies_tier_and_ignore_does_not() {
        let mut conn = seeded();
        apply_member_record(&mut conn, &record("jane@realmail.com", "VIP Membership"), SOURCE).unwrap();
        let id = list_open_conflicts(&conn).unwrap()[0].id;
        let closed = accept_conflict(&mut conn, id, "admin").unwrap();
        assert_eq!(closed.status, ConflictStatus::Resolved);
        assert_eq!(closed.resolution, Some(ConflictResolution::Accepted));
        assert_eq!(
            members::find_by_email(&conn, "jane@realmail.com").unwrap().unwrap().tier,
            "VIP"
        );
        assert!(matches!(
            ignore_conflict(&mut conn, id, "admin"),
            Err(ReconcileError::NotFound(_))
        ));

        apply_member_record(&mut conn, &record("jane@realmail.com", "Social Membership"), SOURCE).unwrap();
        let id = list_open_conflicts(&conn).unwrap()[0].id;
        ignore_conflict(&mut conn, id, "admin").unwrap();
        assert_eq!(
            members::find_by_email(&conn, "jane@realmail.com").unwrap().unwrap().tier,
            "VIP"
        );
    }

    #[test]
    fn directory_rows_parse_by_header_name() {
        let input = "Real_Email,First_Name,Last_Name,membership_tier,mindbody_id,trackman_emails_linked,unused\n\
                     \n\
                     JANE@realmail.com,Jane,Smith,Core Membership,MB-1,j.smith@oldclub.com;js@x.test,zzz\n\
                     ,No,Email,VIP Membership,,,\n";
        let rows = read_member_rows(input.as_bytes());
        assert_eq!(rows.len(), 2);
        let jane = rows[0].1.as_ref().unwrap();
        assert_eq!(jane.email, "jane@realmail.com");
        assert_eq!(jane.external_client_id.as_deref(), Some("MB-1"));
        assert_eq!(jane.linked_emails, vec!["j.smith@oldclub.com", "js@x.test"]);
        assert!(matches!(rows[1].1, Err(ReconcileError::MalformedRow { line: 4, .. })));
    }

    #[test]
    fn unreadable_record_is_skipped_and_the_run_still_lands() {
        let mut conn = seeded();
        let mut input = b"email,first_name,last_name,membership_tier\n\
                          jane@realmail.com,Jane,Smith,Core Membership\n"
            .to_vec();
        input.extend_from_slice(b"broken@x.test,Br\xff\xfeoken,Row,Social Membership\n");
        input.extend_from_slice(b"new@x.test,New,Person,Social Membership\n");

        let summary = run_member_import(&mut conn, &input, "members.csv", "admin", SOURCE).unwrap();
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Row 3: malformed row"));
        assert!(members::find_by_email(&conn, "new@x.test").unwrap().is_some());
        assert!(members::find_by_email(&conn, "broken@x.test").unwrap().is_none());
        assert_eq!(ledger::list_import_runs(&conn).unwrap().len(), 1);
    }

    #[test]
    fn member_import_counts_and_records_a_run() {
        let mut conn = seeded();
        let input = "email,first_name,last_name,membership_tier\n\
                     jane@realmail.com,Jane,Smith,VIP Membership\n\
                     new@x.test,New,Person,Social Membership\n\
                     ,Nobody,Here,Social Membership\n";
        let summary = run_member_import(&mut conn, input.as_bytes(), "members.csv", "admin", SOURCE).unwrap();
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.skipped, 1);
        let runs = ledger::list_import_runs(&conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].matched_rows, 1);
    }
}
