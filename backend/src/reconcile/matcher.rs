//! Identity matching of externally sourced bookings against canonical members.
//!
//! A [`MemberSnapshot`] is taken once per run and never refreshed while the
//! run is in flight; changes to the directory made mid-run become visible to
//! the next run. Matching tries, in order: placeholder filtering, exact email
//! (own address, then linked aliases), exact name, partial name.

use crate::config::DEFAULT_PLACEHOLDER_EMAILS;
use club_common::model::booking::MatchFailure;
use club_common::model::member::CanonicalMember;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Placeholder shape rule: a short all-letters mailbox on the club's own domain.
const PLACEHOLDER_MAX_LEN: usize = 25;
const PLACEHOLDER_LOCAL_LEN: std::ops::RangeInclusive<usize> = 3..=12;

/// Decides which booking emails cannot identify a real person.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    placeholders: HashSet<String>,
    own_domain: String,
}

impl MatchPolicy {
    pub fn new<I, S>(placeholders: I, own_domain: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            placeholders: placeholders
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            own_domain: own_domain.trim().to_lowercase(),
        }
    }

    pub fn is_placeholder(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        if self.placeholders.contains(&email) {
            return true;
        }
        if email.len() >= PLACEHOLDER_MAX_LEN {
            return false;
        }
        match email.split_once('@') {
            Some((local, domain)) if domain == self.own_domain => {
                PLACEHOLDER_LOCAL_LEN.contains(&local.len())
                    && local.chars().all(|c| c.is_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// A raw email worth looking up: present, shaped like an address, and not a placeholder.
    pub fn is_usable(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty() && email.contains('@') && !self.is_placeholder(email)
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_EMAILS.split(','), "evenhouse.club")
    }
}

/// Which rule produced a match. Persisted next to the booking for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStrategy {
    Email,
    LinkedEmail,
    FullName,
    PartialName { key: String },
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::LinkedEmail => f.write_str("linked-email"),
            Self::FullName => f.write_str("name"),
            Self::PartialName { key } => write!(f, "partial-name:{}", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched {
        email: String,
        strategy: MatchStrategy,
    },
    Unmatched(MatchFailure),
}

/// Read-only lookup indexes over the member directory at one point in time.
///
/// Name keys are kept in insertion order (member creation order, full name
/// before first name) so the partial-name scan is reproducible. A key that
/// two members share belongs to the first one indexed.
#[derive(Debug, Default)]
pub struct MemberSnapshot {
    by_email: HashMap<String, String>,
    by_linked_email: HashMap<String, String>,
    name_positions: HashMap<String, usize>,
    names: Vec<(String, String)>,
}

impl MemberSnapshot {
    pub fn build(members: &[CanonicalMember]) -> Self {
        let mut snapshot = Self::default();
        for member in members {
            let email = member.email.trim();
            if email.is_empty() {
                continue;
            }
            snapshot
                .by_email
                .entry(email.to_lowercase())
                .or_insert_with(|| email.to_string());
            for alias in &member.linked_emails {
                let alias = alias.trim().to_lowercase();
                if !alias.is_empty() {
                    snapshot
                        .by_linked_email
                        .entry(alias)
                        .or_insert_with(|| email.to_string());
                }
            }
            snapshot.index_name(&member.full_name(), email);
            snapshot.index_name(&member.first_name, email);
        }
        snapshot
    }

    /// Snapshots the members table in creation order.
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let members = crate::db::members::load_all(conn)?;
        Ok(Self::build(&members))
    }

    pub fn member_count(&self) -> usize {
        self.by_email.len()
    }

    fn index_name(&mut self, name: &str, email: &str) {
        let key = normalize_name(name);
        if key.is_empty() || self.name_positions.contains_key(&key) {
            return;
        }
        self.name_positions.insert(key.clone(), self.names.len());
        self.names.push((key, email.to_string()));
    }
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Matches external identities against one immutable snapshot.
#[derive(Debug)]
pub struct IdentityMatcher {
    snapshot: MemberSnapshot,
    policy: MatchPolicy,
}

impl IdentityMatcher {
    pub fn new(snapshot: MemberSnapshot, policy: MatchPolicy) -> Self {
        Self { snapshot, policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> &MemberSnapshot {
        &self.snapshot
    }

    pub fn match_identity(&self, raw_name: &str, raw_email: &str) -> MatchOutcome {
        let email = raw_email.trim().to_lowercase();
        let placeholder = !email.is_empty() && self.policy.is_placeholder(&email);
        let usable = self.policy.is_usable(&email);

        if usable {
            if let Some(canonical) = self.snapshot.by_email.get(&email) {
                return matched(canonical, MatchStrategy::Email);
            }
            if let Some(canonical) = self.snapshot.by_linked_email.get(&email) {
                return matched(canonical, MatchStrategy::LinkedEmail);
            }
        }

        if let Some(outcome) = self.match_name(raw_name) {
            return outcome;
        }

        MatchOutcome::Unmatched(if placeholder {
            MatchFailure::PlaceholderEmail
        } else if usable {
            MatchFailure::EmailNotFound
        } else {
            MatchFailure::NameNotFound
        })
    }

    fn match_name(&self, raw_name: &str) -> Option<MatchOutcome> {
        let name = normalize_name(raw_name);
        if name.is_empty() {
            return None;
        }
        if let Some(&pos) = self.snapshot.name_positions.get(&name) {
            return Some(matched(&self.snapshot.names[pos].1, MatchStrategy::FullName));
        }

        let tokens: Vec<&str> = name.split(' ').collect();
        if tokens.len() < 2 {
            return None;
        }
        let (first, last) = (tokens[0], tokens[tokens.len() - 1]);
        self.snapshot
            .names
            .iter()
            .find(|(key, _)| key.contains(first) && key.contains(last))
            .map(|(key, email)| {
                matched(email, MatchStrategy::PartialName { key: key.clone() })
            })
    }
}

fn matched(email: &str, strategy: MatchStrategy) -> MatchOutcome {
    MatchOutcome::Matched {
        email: email.to_string(),
        strategy,
    }
}
