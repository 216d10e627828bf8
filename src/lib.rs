#[macro_use]
extern crate rocket;

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod env;
pub mod error;
pub mod models;
pub mod routes;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use std::time::Duration;

use anyhow::Context;
use rocket::figment::Figment;
use rocket::fs::FileServer;
use rocket::{Build, Rocket, tokio};
use rocket_dyn_templates::Template;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};

use auth::Accounts;
use catalog::{Catalog, ImageStore};
use config::AppConfig;
use error::AppError;
use telemetry::TelemetryFairing;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Launch error: {0}")]
    Launch(Box<rocket::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Launch(Box::new(value))
    }
}

/// Builds the web application on top of `figment` with an already migrated
/// pool. Catalog and account services become managed state and uploaded
/// images are served under `/static`.
pub fn init_rocket(figment: Figment, pool: SqlitePool) -> Result<Rocket<Build>, Error> {
    let config = AppConfig::from_figment(&figment)?;
    info!(
        upload_dir = %config.upload_dir.display(),
        max_upload = %config.file_limit(),
        "Starting shop catalog"
    );

    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("creating upload directory {}", config.upload_dir.display())
    })?;
    let figment = config.apply_limits(figment);

    let catalog = Catalog::new(pool.clone(), ImageStore::new(&config.upload_dir));
    let accounts = Accounts::new(pool, config.session_ttl());

    Ok(rocket::custom(figment)
        .manage(catalog)
        .manage(accounts)
        .mount(
            "/",
            routes![
                routes::index,
                routes::view_product,
                routes::search,
                routes::search_box,
                routes::category,
                routes::add_product_form,
                routes::add_product,
                routes::edit_product_form,
                routes::edit_product,
                routes::delete_product,
                routes::page_not_found,
                routes::health,
                auth::auth::login,
                auth::auth::process_login,
                auth::auth::register,
                auth::auth::process_register,
                auth::auth::logout,
            ],
        )
        .mount("/static", FileServer::new(&config.upload_dir))
        .register(
            "/",
            catchers![
                auth::forbidden,
                routes::not_found,
                routes::payload_too_large,
                routes::unprocessable,
                routes::internal_error,
            ],
        )
        .attach(Template::fairing())
        .attach(TelemetryFairing))
}

/// Removes expired login sessions once an hour for as long as the runtime
/// lives.
pub fn spawn_session_cleanup(pool: SqlitePool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match db::clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(SESSION_CLEANUP_INTERVAL).await;
        }
    })
}
