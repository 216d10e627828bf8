use std::path::Path;

use tracing::{info, warn};

/// Loads `config/common.env`, the profile file and `.secrets.env`, in that
/// order. Later files override earlier ones; missing files are skipped.
pub fn load_environment() -> Result<(), dotenvy::Error> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string()) == "release";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), dotenvy::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
