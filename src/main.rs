use anyhow::Context;
use tracing::info;

use shop_catalog::config::{AppConfig, app_figment};
use shop_catalog::{Error, db, env, init_rocket, spawn_session_cleanup, telemetry};

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment().context("loading environment files")?;
    let _telemetry = telemetry::init_tracing();

    let figment = app_figment(rocket::Config::figment());
    let config = AppConfig::from_figment(&figment)?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    spawn_session_cleanup(pool.clone());

    let rocket = init_rocket(figment, pool)?;
    let _ = rocket.launch().await?;

    info!("Shop catalog stopped");
    Ok(())
}
