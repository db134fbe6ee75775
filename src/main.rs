use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use std::sync::Arc;

mod api;
mod auth;
mod billing;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod reconciler;
mod routes;
mod schedule;
mod sessions;
mod store;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::sessions::EditSessions;
use crate::store::mysql::MySqlStore;
use crate::store::{AttendanceStore, RosterStore};
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Dance school admin is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url)
        .await
        .context("database initialisation failed")?;

    let store = Arc::new(MySqlStore::new(pool.clone()));
    let attendance_store: Data<dyn AttendanceStore> =
        Data::from(store.clone() as Arc<dyn AttendanceStore>);
    let roster_store: Data<dyn RosterStore> = Data::from(store as Arc<dyn RosterStore>);
    let sessions = Data::new(EditSessions::new(
        config.edit_session_ttl,
        config.store_timeout,
    ));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(attendance_store.clone())
            .app_data(roster_store.clone())
            .app_data(sessions.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("cannot bind {}", server_addr))?
    .run()
    .await?;

    Ok(())
}
