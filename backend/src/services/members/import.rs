//! Member directory import handlers.
//!
//! Both handlers run the whole file on the blocking pool and answer with a
//! `MemberImportSummary`. Tier differences never change a member here; they
//! surface as open conflicts under `/api/members/conflicts`.

use crate::config::Settings;
use crate::reconcile::tier_conflicts;
use crate::services::{acting_user, receive_csv_upload, resolve_import_path, with_connection};
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use club_common::requests::ImportFileRequest;
use log::warn;

/// `POST /api/members/import`
pub async fn process_path(
    req: HttpRequest,
    settings: web::Data<Settings>,
    body: web::Json<ImportFileRequest>,
) -> impl Responder {
    let imported_by = acting_user(&req);
    let path = match resolve_import_path(&settings.import_dir, &body.filename) {
        Ok(path) => path,
        Err(e) => return e.error_response(),
    };
    let source = settings.conflict_source.clone();

    let result = with_connection(&settings, move |conn| {
        tier_conflicts::import_members_from_path(conn, &path, &imported_by, &source)
    })
    .await;
    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            warn!("Member import of {} failed: {}", body.filename, e);
            e.error_response()
        }
    }
}

/// `POST /api/members/upload`
pub async fn process_upload(
    req: HttpRequest,
    settings: web::Data<Settings>,
    payload: Multipart,
) -> impl Responder {
    let imported_by = acting_user(&req);
    let (upload, filename) = match receive_csv_upload(payload, settings.max_upload_bytes).await {
        Ok(received) => received,
        Err(e) => {
            warn!("Rejected member upload: {}", e);
            return e.error_response();
        }
    };
    let source = settings.conflict_source.clone();

    let result = with_connection(&settings, move |conn| {
        tier_conflicts::import_members_from_upload(conn, upload, &filename, &imported_by, &source)
    })
    .await;
    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            warn!("Member upload import failed: {}", e);
            e.error_response()
        }
    }
}
