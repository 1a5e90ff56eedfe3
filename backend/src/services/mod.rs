//! HTTP surface of the reconciliation pipeline.
//!
//! Handlers stay thin: they extract the request, hand the work to a blocking
//! thread with its own database connection, and turn the outcome into JSON.
//! Errors render through [`ReconcileError`]'s `ResponseError` impl.

pub mod bookings;
pub mod members;

use crate::config::Settings;
use crate::db;
use crate::error::{ReconcileError, Result};
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest};
use futures_util::StreamExt;
use regex::Regex;
use rusqlite::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Header naming the staff member behind a request.
pub const ACTING_USER_HEADER: &str = "X-User-Email";
const DEFAULT_ACTING_USER: &str = "admin";

/// Who to record as importer or resolver.
pub fn acting_user(req: &HttpRequest) -> String {
    req.headers()
        .get(ACTING_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTING_USER)
        .to_string()
}

/// Resolves a requested file name inside the import directory. Only bare
/// `.csv` names are accepted; anything with a path component is rejected.
pub fn resolve_import_path(import_dir: &Path, filename: &str) -> Result<PathBuf> {
    let filename = filename.trim();
    let pattern = Regex::new(r"^[A-Za-z0-9_.-]+\.csv$")
        .map_err(|e| ReconcileError::InvalidInput(format!("Regex error: {}", e)))?;
    if !pattern.is_match(filename) || filename.starts_with('.') {
        return Err(ReconcileError::InvalidInput(format!(
            "\"{}\" is not a plain .csv file name",
            filename
        )));
    }
    let path = import_dir.join(filename);
    if !path.is_file() {
        return Err(ReconcileError::NotFound(format!("Import file {}", filename)));
    }
    Ok(path)
}

/// Streams the `file` part of a multipart upload into a temporary file.
/// Returns the temporary file and the client-side file name.
pub async fn receive_csv_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<(NamedTempFile, String)> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ReconcileError::Upload(e.to_string()))?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));
        if name.as_deref() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
            .unwrap_or_default();
        let filename = Path::new(&filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(ReconcileError::Upload("The file must end with .csv".into()));
        }

        let mut upload = tempfile::Builder::new()
            .prefix("club-upload-")
            .suffix(".csv")
            .tempfile()?;
        let mut written = 0usize;
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ReconcileError::Upload(e.to_string()))?;
            written += chunk.len();
            if written > max_bytes {
                return Err(ReconcileError::Upload(format!(
                    "file exceeds {} bytes",
                    max_bytes
                )));
            }
            upload.write_all(&chunk)?;
        }
        upload.flush()?;
        return Ok((upload, filename));
    }
    Err(ReconcileError::Upload("Missing file".into()))
}

/// Runs `work` on the blocking pool with a fresh connection to the configured database.
pub async fn with_connection<T, F>(settings: &web::Data<Settings>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    let database = settings.database.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = db::open(&database)?;
        work(&mut conn)
    })
    .await
    .map_err(|e| ReconcileError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use clap::Parser;
    use tempfile::TempDir;

    /// Settings pointing at a fresh database and import directory under `dir`.
    pub(crate) fn settings_in(dir: &TempDir) -> Settings {
        let database = dir.path().join("club.sqlite");
        Settings::parse_from([
            "club-reconcile",
            "--database",
            database.to_str().unwrap(),
            "--import-dir",
            dir.path().to_str().unwrap(),
        ])
    }

    #[test]
    fn acting_user_defaults_to_admin() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(acting_user(&req), "admin");
        let req = TestRequest::default()
            .insert_header((ACTING_USER_HEADER, "staff@evenhouse.club"))
            .to_http_request();
        assert_eq!(acting_user(&req), "staff@evenhouse.club");
    }

    #[test]
    fn import_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bookings.csv"), "x").unwrap();
        assert!(resolve_import_path(dir.path(), "bookings.csv").is_ok());
        for bad in ["../bookings.csv", "/etc/passwd", "sub/bookings.csv", "bookings.txt", ".csv"] {
            assert!(matches!(
                resolve_import_path(dir.path(), bad),
                Err(ReconcileError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            resolve_import_path(dir.path(), "missing.csv"),
            Err(ReconcileError::NotFound(_))
        ));
    }
}
