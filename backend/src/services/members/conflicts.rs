use crate::config::Settings;
use crate::reconcile::tier_conflicts;
use crate::services::{acting_user, with_connection};
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};

/// `GET /api/members/conflicts`
pub async fn list(settings: web::Data<Settings>) -> impl Responder {
    match with_connection(&settings, |conn| tier_conflicts::list_open_conflicts(conn)).await {
        Ok(open) => HttpResponse::Ok().json(open),
        Err(e) => e.error_response(),
    }
}

/// `POST /api/members/conflicts/{id}/accept`
pub async fn accept(
    req: HttpRequest,
    settings: web::Data<Settings>,
    id: web::Path<i64>,
) -> impl Responder {
    let resolved_by = acting_user(&req);
    let id = id.into_inner();
    respond(with_connection(&settings, move |conn| {
        tier_conflicts::accept_conflict(conn, id, &resolved_by)
    })
    .await)
}

/// `POST /api/members/conflicts/{id}/ignore`
pub async fn ignore(
    req: HttpRequest,
    settings: web::Data<Settings>,
    id: web::Path<i64>,
) -> impl Responder {
    let resolved_by = acting_user(&req);
    let id = id.into_inner();
    respond(with_connection(&settings, move |conn| {
        tier_conflicts::ignore_conflict(conn, id, &resolved_by)
    })
    .await)
}

fn respond<T: serde::Serialize>(result: crate::error::Result<T>) -> HttpResponse {
    match result {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(e) => e.error_response(),
    }
}
