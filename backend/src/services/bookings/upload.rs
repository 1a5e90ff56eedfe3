//! `POST /api/bookings/upload`: imports a booking export sent as multipart form data.

use crate::config::Settings;
use crate::reconcile::orchestrator;
use crate::services::{acting_user, receive_csv_upload, with_connection};
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use log::warn;

pub async fn process(
    req: HttpRequest,
    settings: web::Data<Settings>,
    payload: Multipart,
) -> impl Responder {
    let imported_by = acting_user(&req);
    let (upload, filename) = match receive_csv_upload(payload, settings.max_upload_bytes).await {
        Ok(received) => received,
        Err(e) => {
            warn!("Rejected booking upload: {}", e);
            return e.error_response();
        }
    };
    let policy = settings.match_policy();

    let result = with_connection(&settings, move |conn| {
        orchestrator::import_from_upload(conn, upload, &filename, &imported_by, &policy)
    })
    .await;
    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            warn!("Booking upload import failed: {}", e);
            e.error_response()
        }
    }
}
