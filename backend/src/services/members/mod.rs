//! Member directory import and tier conflict review endpoints.
//!
//! The provided routes are:
//! - `POST /api/members/import`: merges a directory export from the import
//!   directory into the member records. Body: `{"filename": "..."}`.
//! - `POST /api/members/upload`: the same for a multipart `file` upload.
//! - `GET /api/members/conflicts`: open tier conflicts, newest first.
//! - `POST /api/members/conflicts/{id}/accept`: applies the incoming tier.
//! - `POST /api/members/conflicts/{id}/ignore`: keeps the stored tier.

use actix_web::web::{get, post, scope};
use actix_web::Scope;

mod conflicts;
mod import;

const API_PATH: &str = "/api/members";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/import", post().to(import::process_path))
        .route("/upload", post().to(import::process_upload))
        .route("/conflicts", get().to(conflicts::list))
        .route("/conflicts/{id}/accept", post().to(conflicts::accept))
        .route("/conflicts/{id}/ignore", post().to(conflicts::ignore))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::members::tests::member;
    use crate::services::tests::settings_in;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use club_common::model::import::MemberImportSummary;
    use club_common::model::member::{ConflictResolution, TierConflict};

    #[actix_web::test]
    async fn directory_import_raises_reviewable_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(&dir);
        let conn = db::open(&settings.database).unwrap();
        db::members::insert(&conn, &member("jane@realmail.com", "Jane", "Smith", "Core")).unwrap();
        std::fs::write(
            dir.path().join("members.csv"),
            "email,first_name,last_name,membership_tier\n\
             jane@realmail.com,Jane,Smith,VIP Membership\n",
        )
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings))
                .service(configure_routes()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/members/import")
            .set_json(serde_json::json!({ "filename": "members.csv" }))
            .to_request();
        let summary: MemberImportSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.conflicts, 1);

        let req = test::TestRequest::get().uri("/api/members/conflicts").to_request();
        let open: Vec<TierConflict> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(open.len(), 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/members/conflicts/{}/accept", open[0].id))
            .to_request();
        let closed: TierConflict = test::call_and_read_body_json(&app, req).await;
        assert_eq!(closed.resolution, Some(ConflictResolution::Accepted));
        assert_eq!(closed.resolved_by.as_deref(), Some("admin"));

        let req = test::TestRequest::post()
            .uri(&format!("/api/members/conflicts/{}/ignore", open[0].id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let jane = db::members::find_by_email(&conn, "jane@realmail.com").unwrap().unwrap();
        assert_eq!(jane.tier, "VIP");
    }
}
