//! Booking import and unmatched-booking review endpoints.
//!
//! The provided routes are:
//! - `POST /api/bookings/import`: imports a booking export already present in
//!   the import directory. The body names the file: `{"filename": "..."}`.
//!
//! - `POST /api/bookings/upload`: imports a booking export sent as the `file`
//!   part of a multipart form. The upload is deleted once the run finishes.
//!
//! - `GET /api/bookings/unmatched`: pages through unmatched bookings, newest
//!   first. Accepts `resolved`, `limit` and `offset` query parameters.
//!
//! - `PUT /api/bookings/unmatched/{id}/resolve`: attributes an unmatched
//!   booking to `{"memberEmail": "..."}` and auto-resolves its siblings.
//!
//! - `GET /api/bookings/import-runs`: the import ledger, newest first.
//!
//! The acting user is read from the `X-User-Email` header.

use actix_web::web::{get, post, put, scope};
use actix_web::Scope;

mod import;
mod resolve;
mod runs;
mod unmatched;
mod upload;

const API_PATH: &str = "/api/bookings";

/// Configures and returns the Actix scope for booking routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/import", post().to(import::process))
        .route("/upload", post().to(upload::process))
        .route("/unmatched", get().to(unmatched::process))
        .route("/unmatched/{id}/resolve", put().to(resolve::process))
        .route("/import-runs", get().to(runs::process))
}
