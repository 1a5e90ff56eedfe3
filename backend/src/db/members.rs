use super::{json_column, to_json};
use chrono::Utc;
use club_common::model::member::CanonicalMember;
use rusqlite::{params, Connection, OptionalExtension, Row};

const MEMBER_COLUMNS: &str = "id, email, first_name, last_name, phone, tier, tags, \
     lifetime_visits, external_client_id, linked_emails";

fn map_member(row: &Row<'_>) -> rusqlite::Result<(i64, CanonicalMember)> {
    Ok((
        row.get(0)?,
        CanonicalMember {
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            phone: row.get(4)?,
            tier: row.get(5)?,
            tags: json_column(row, 6)?,
            lifetime_visits: row.get(7)?,
            external_client_id: row.get(8)?,
            linked_emails: json_column(row, 9)?,
        },
    ))
}

/// All members in creation order.
pub fn load_all(conn: &Connection) -> rusqlite::Result<Vec<CanonicalMember>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM members ORDER BY id", MEMBER_COLUMNS))?;
    let rows = stmt.query_map([], map_member)?;
    rows.map(|r| r.map(|(_, m)| m)).collect()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<CanonicalMember>> {
    conn.query_row(
        &format!("SELECT {} FROM members WHERE email = ?1", MEMBER_COLUMNS),
        params![email.trim()],
        map_member,
    )
    .optional()
    .map(|found| found.map(|(_, m)| m))
}

/// Looks a member up by email or, failing that, by external client id.
/// An email hit wins when both keys point at different members.
pub fn find_by_email_or_client_id(
    conn: &Connection,
    email: &str,
    external_client_id: Option<&str>,
) -> rusqlite::Result<Option<(i64, CanonicalMember)>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM members
             WHERE email = ?1 OR (?2 IS NOT NULL AND external_client_id = ?2)
             ORDER BY (email = ?1) DESC, id
             LIMIT 1",
            MEMBER_COLUMNS
        ),
        params![email.trim(), external_client_id],
        map_member,
    )
    .optional()
}

pub fn insert(conn: &Connection, member: &CanonicalMember) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO members
            (email, first_name, last_name, phone, tier, tags, lifetime_visits,
             external_client_id, linked_emails, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            member.email.trim(),
            member.first_name,
            member.last_name,
            member.phone,
            member.tier,
            to_json(&member.tags)?,
            member.lifetime_visits,
            member.external_client_id,
            to_json(&member.linked_emails)?,
            Utc::now().naive_utc(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Writes every field except tier and the visit counter.
pub fn update_profile(conn: &Connection, id: i64, member: &CanonicalMember) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE members SET
            first_name = ?1, last_name = ?2, phone = ?3, tags = ?4,
            external_client_id = ?5, linked_emails = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            member.first_name,
            member.last_name,
            member.phone,
            to_json(&member.tags)?,
            member.external_client_id,
            to_json(&member.linked_emails)?,
            Utc::now().naive_utc(),
            id,
        ],
    )
}

pub fn set_tier(conn: &Connection, email: &str, tier: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE members SET tier = ?1, updated_at = ?2 WHERE email = ?3",
        params![tier, Utc::now().naive_utc(), email.trim()],
    )
}

/// Adds one visit in a single statement, so concurrent increments cannot be lost.
pub fn increment_visits(conn: &Connection, email: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE members SET lifetime_visits = lifetime_visits + 1 WHERE email = ?1",
        params![email.trim()],
    )
}

/// Appends `alias` to the member's linked emails unless it is already there
/// or is the member's own address. Returns whether anything changed.
pub fn add_linked_email(conn: &Connection, email: &str, alias: &str) -> rusqlite::Result<bool> {
    let alias = alias.trim().to_lowercase();
    let Some(member) = find_by_email(conn, email)? else {
        return Ok(false);
    };
    if alias.is_empty()
        || member.email.eq_ignore_ascii_case(&alias)
        || member.linked_emails.iter().any(|e| e.eq_ignore_ascii_case(&alias))
    {
        return Ok(false);
    }
    let mut linked = member.linked_emails;
    linked.push(alias);
    conn.execute(
        "UPDATE members SET linked_emails = ?1, updated_at = ?2 WHERE email = ?3",
        params![to_json(&linked)?, Utc::now().naive_utc(), member.email],
    )?;
    Ok(true)
}
