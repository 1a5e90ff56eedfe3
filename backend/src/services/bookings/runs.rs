use crate::config::Settings;
use crate::reconcile::ledger;
use crate::services::with_connection;
use actix_web::{web, HttpResponse, Responder, ResponseError};

/// `GET /api/bookings/import-runs`: every import run, newest first.
pub async fn process(settings: web::Data<Settings>) -> impl Responder {
    match with_connection(&settings, |conn| ledger::list_import_runs(conn)).await {
        Ok(runs) => HttpResponse::Ok().json(runs),
        Err(e) => e.error_response(),
    }
}
