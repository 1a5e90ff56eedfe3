//! `POST /api/bookings/import`: imports a booking export from the import directory.

use crate::config::Settings;
use crate::reconcile::orchestrator;
use crate::services::{acting_user, resolve_import_path, with_connection};
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use club_common::requests::ImportFileRequest;
use log::warn;

pub async fn process(
    req: HttpRequest,
    settings: web::Data<Settings>,
    body: web::Json<ImportFileRequest>,
) -> impl Responder {
    let imported_by = acting_user(&req);
    let path = match resolve_import_path(&settings.import_dir, &body.filename) {
        Ok(path) => path,
        Err(e) => return e.error_response(),
    };
    let policy = settings.match_policy();

    let result = with_connection(&settings, move |conn| {
        orchestrator::import_from_path(conn, &path, &imported_by, &policy)
    })
    .await;
    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            warn!("Booking import of {} failed: {}", body.filename, e);
            e.error_response()
        }
    }
}
