//! `PUT /api/bookings/unmatched/{id}/resolve`
//!
//! Books the unmatched record for the chosen member, auto-resolves the other
//! pending records that share its raw email, and remembers that email as one
//! of the member's linked addresses. Responds `404` for an unknown record or
//! member and `409` when the record was already resolved.

use crate::config::Settings;
use crate::reconcile::resolution;
use crate::services::{acting_user, with_connection};
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use club_common::requests::ResolveUnmatchedRequest;
use log::warn;

pub async fn process(
    req: HttpRequest,
    settings: web::Data<Settings>,
    id: web::Path<i64>,
    body: web::Json<ResolveUnmatchedRequest>,
) -> impl Responder {
    let resolved_by = acting_user(&req);
    let id = id.into_inner();
    let member_email = body.into_inner().member_email;
    let policy = settings.match_policy();

    let result = with_connection(&settings, move |conn| {
        resolution::resolve_unmatched(conn, id, &member_email, &resolved_by, &policy)
    })
    .await;
    match result {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => {
            warn!("Resolving unmatched booking {} failed: {}", id, e);
            e.error_response()
        }
    }
}
