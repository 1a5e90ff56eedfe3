//! Human resolution of unmatched bookings.
//!
//! Resolving one record books it for the chosen member and then resolves
//! every other pending record that carries the same raw email, all inside one
//! write transaction. The pending -> resolved transition is the only one a
//! record ever makes.

use super::matcher::MatchPolicy;
use super::orchestrator::create_booking;
use crate::db::{self, bookings, members, unmatched};
use crate::error::{ReconcileError, Result};
use chrono::{NaiveDateTime, Utc};
use club_common::model::booking::UnmatchedBooking;
use club_common::model::import::ResolveOutcome;
use club_common::requests::UnmatchedQuery;
use log::info;
use rusqlite::Connection;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;

const EXPLICIT_STRATEGY: &str = "manual";
const PROPAGATED_STRATEGY: &str = "propagated";

pub fn list_unmatched(conn: &Connection, query: &UnmatchedQuery) -> Result<Vec<UnmatchedBooking>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    Ok(unmatched::list(
        conn,
        query.resolved,
        limit,
        query.offset.unwrap_or(0),
    )?)
}

/// Attributes unmatched booking `unmatched_id` to `member_email` and
/// propagates the decision to its pending siblings.
///
/// Fails with `NotFound` for an unknown record or member and with
/// `AlreadyResolved` for a record that is no longer pending; nothing is
/// written in either case. Placeholder and blank raw emails identify nobody,
/// so they are never propagated.
pub fn resolve_unmatched(
    conn: &mut Connection,
    unmatched_id: i64,
    member_email: &str,
    resolved_by: &str,
    policy: &MatchPolicy,
) -> Result<ResolveOutcome> {
    let tx = db::write_transaction(conn)?;
    let target = unmatched::get(&tx, unmatched_id)?
        .ok_or_else(|| ReconcileError::NotFound(format!("Unmatched booking {}", unmatched_id)))?;
    if !target.is_pending() {
        return Err(ReconcileError::AlreadyResolved(unmatched_id));
    }
    let member = members::find_by_email(&tx, member_email)?
        .ok_or_else(|| ReconcileError::NotFound(format!("Member {}", member_email.trim())))?;

    let now = Utc::now().naive_utc();
    resolve_one(&tx, &target, &member.email, resolved_by, now, EXPLICIT_STRATEGY)?;

    let mut auto_resolved = 0u32;
    if policy.is_usable(&target.raw_email) {
        for sibling in unmatched::pending_with_raw_email(&tx, &target.raw_email, target.id)? {
            resolve_one(&tx, &sibling, &member.email, resolved_by, now, PROPAGATED_STRATEGY)?;
            auto_resolved += 1;
        }
        members::add_linked_email(&tx, &member.email, &target.raw_email)?;
    }
    tx.commit()?;

    info!(
        "Unmatched booking {} resolved to {} by {} ({} auto-resolved)",
        target.external_id, member.email, resolved_by, auto_resolved
    );
    Ok(ResolveOutcome {
        resolved: true,
        resolved_count: 1 + auto_resolved,
        auto_resolved_count: auto_resolved,
    })
}

fn resolve_one(
    conn: &Connection,
    record: &UnmatchedBooking,
    member_email: &str,
    resolved_by: &str,
    now: NaiveDateTime,
    strategy: &str,
) -> Result<()> {
    create_booking(
        conn,
        &bookings::NewBooking {
            external_id: &record.external_id,
            member_email,
            member_name: &record.raw_name,
            resource_id: record.resource_id.as_deref(),
            date: record.date,
            start_time: record.start_time,
            end_time: record.end_time,
            duration_minutes: record.duration_minutes,
            party_size: record.party_size,
            status: record.status,
            notes: &record.notes,
            booked_at: record.booked_at,
            match_strategy: strategy,
        },
    )?;
    if !unmatched::mark_resolved(conn, record.id, member_email, resolved_by, now)? {
        return Err(ReconcileError::AlreadyResolved(record.id));
    }
    Ok(())
}
