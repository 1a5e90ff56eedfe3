//! The reconciliation core: ingestion, identity matching, booking import,
//! unmatched resolution, tier conflict detection and the import ledger.
//!
//! Nothing in here knows about HTTP. Every operation takes an open SQLite
//! connection and runs to completion on the calling thread.

pub mod ingest;
pub mod ledger;
pub mod matcher;
pub mod orchestrator;
pub mod resolution;
pub mod tier_conflicts;

use crate::error::Result;
use log::warn;
use std::path::Path;
use tempfile::NamedTempFile;

/// Runs `work` against an uploaded file and deletes the file afterwards,
/// whether `work` succeeded or not.
pub fn consume_upload<T>(upload: NamedTempFile, work: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let result = work(upload.path());
    let path = upload.path().to_path_buf();
    if let Err(e) = upload.close() {
        warn!("Could not remove uploaded file {}: {}", path.display(), e);
    }
    result
}
