//! Runtime settings, read from command-line flags or the environment.

use crate::reconcile::matcher::MatchPolicy;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_PLACEHOLDER_EMAILS: &str =
    "anonymous@yourgolfbooking.com,booking@evenhouse.club,bookings@evenhouse.club";

#[derive(Debug, Clone, Parser)]
#[command(name = "club-reconcile", about = "Booking and member import reconciliation service")]
pub struct Settings {
    /// Address the HTTP server binds to.
    #[arg(long, env = "CLUB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "CLUB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database file.
    #[arg(long, env = "CLUB_DATABASE", default_value = "club.sqlite")]
    pub database: PathBuf,

    /// Directory that path-based imports resolve file names against.
    #[arg(long, env = "CLUB_IMPORT_DIR", default_value = "attached_assets")]
    pub import_dir: PathBuf,

    /// The club's own mail domain, used by the placeholder address shape rule.
    #[arg(long, env = "CLUB_DOMAIN", default_value = "evenhouse.club")]
    pub club_domain: String,

    /// Addresses known never to identify a real member.
    #[arg(
        long,
        env = "CLUB_PLACEHOLDER_EMAILS",
        value_delimiter = ',',
        default_value = DEFAULT_PLACEHOLDER_EMAILS
    )]
    pub placeholder_emails: Vec<String>,

    /// Source tag written on tier conflicts raised by member directory imports.
    #[arg(long, env = "CLUB_CONFLICT_SOURCE", default_value = "member_csv")]
    pub conflict_source: String,

    #[arg(long, env = "CLUB_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::new(self.placeholder_emails.iter().cloned(), &self.club_domain)
    }
}
