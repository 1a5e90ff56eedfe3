use crate::config::Settings;
use crate::reconcile::resolution;
use crate::services::with_connection;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use club_common::requests::UnmatchedQuery;

/// `GET /api/bookings/unmatched`
pub async fn process(
    settings: web::Data<Settings>,
    query: web::Query<UnmatchedQuery>,
) -> impl Responder {
    let query = query.into_inner();
    match with_connection(&settings, move |conn| resolution::list_unmatched(conn, &query)).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => e.error_response(),
    }
}
