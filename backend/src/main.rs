use actix_web::{web, App, HttpServer};
use clap::Parser;
use club_reconcile::config::Settings;
use club_reconcile::{db, services};
use env_logger::Env;
use log::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let settings = Settings::parse();

    // Fail fast on an unusable database instead of on the first request.
    db::open(&settings.database).map_err(std::io::Error::other)?;
    info!(
        "Using database {} and import directory {}",
        settings.database.display(),
        settings.import_dir.display()
    );

    let host = settings.host.clone();
    let port = settings.port;
    let json_limit = settings.max_upload_bytes;
    let settings = web::Data::new(settings);

    info!("Server running at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(json_limit))
            .app_data(settings.clone())
            .service(services::bookings::configure_routes())
            .service(services::members::configure_routes())
    })
        .bind((host.as_str(), port))?
        .run()
        .await
}
