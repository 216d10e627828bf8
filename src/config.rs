use std::path::PathBuf;

use rocket::data::{ByteUnit, ToByteUnit};
use rocket::figment::Figment;
use rocket::figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

/// Longest login session a deployment may configure: one year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

const ENV_KEYS: [&str; 4] = [
    "database_url",
    "upload_dir",
    "session_ttl_hours",
    "max_upload_mib",
];

/// Settings for the catalog, read from `Rocket.toml`, `ROCKET_*` variables
/// and the plain `DATABASE_URL`, `UPLOAD_DIR`, `SESSION_TTL_HOURS` and
/// `MAX_UPLOAD_MIB` variables. Plain variables win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub session_ttl_hours: i64,
    /// Largest product image accepted, in MiB.
    pub max_upload_mib: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://catalog.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("static"),
            session_ttl_hours: 24,
            max_upload_mib: 16,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        let config: AppConfig = figment.extract()?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&config.session_ttl_hours) {
            return Err(rocket::figment::Error::from(format!(
                "session_ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS, config.session_ttl_hours
            )));
        }
        if config.max_upload_mib == 0 {
            return Err(rocket::figment::Error::from(
                "max_upload_mib must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    /// Limit for a single uploaded file.
    pub fn file_limit(&self) -> ByteUnit {
        self.max_upload_mib.mebibytes()
    }

    /// Limit for a whole multipart form: the file plus a MiB for the rest.
    pub fn data_form_limit(&self) -> ByteUnit {
        self.max_upload_mib.saturating_add(1).mebibytes()
    }

    /// `figment` with Rocket's `file` and `data-form` limits raised to fit
    /// the configured upload size.
    pub fn apply_limits(&self, figment: Figment) -> Figment {
        figment
            .merge(("limits.file", self.file_limit()))
            .merge(("limits.data-form", self.data_form_limit()))
    }
}

/// Rocket's figment with the catalog defaults underneath and the plain
/// environment variables on top.
pub fn app_figment(base: Figment) -> Figment {
    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(base)
        .merge(Env::raw().only(&ENV_KEYS).global())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn load() -> Result<AppConfig, rocket::figment::Error> {
        AppConfig::from_figment(&app_figment(Figment::new()))
    }

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        temp_env::with_vars_unset(
            ["DATABASE_URL", "UPLOAD_DIR", "SESSION_TTL_HOURS", "MAX_UPLOAD_MIB"],
            || {
            let config = load().unwrap();
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.session_ttl(), chrono::Duration::hours(24));
            },
        );
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite::memory:")),
                ("UPLOAD_DIR", Some("/tmp/catalog-images")),
                ("SESSION_TTL_HOURS", Some("2")),
                ("MAX_UPLOAD_MIB", Some("4")),
            ],
            || {
                let config = load().unwrap();
                assert_eq!(config.database_url, "sqlite::memory:");
                assert_eq!(config.upload_dir, PathBuf::from("/tmp/catalog-images"));
                assert_eq!(config.session_ttl(), chrono::Duration::hours(2));
                assert_eq!(config.file_limit(), 4.mebibytes());
            },
        );
    }

    #[test]
    #[serial]
    fn rejects_non_positive_session_ttl() {
        temp_env::with_var("SESSION_TTL_HOURS", Some("0"), || {
            assert!(load().is_err());
        });
    }

    #[test]
    #[serial]
    fn caps_session_ttl_at_one_year() {
        temp_env::with_var("SESSION_TTL_HOURS", Some("8760"), || {
            assert_eq!(load().unwrap().session_ttl(), chrono::Duration::days(365));
        });
        temp_env::with_var("SESSION_TTL_HOURS", Some("8761"), || {
            assert!(load().is_err());
        });
        temp_env::with_var("SESSION_TTL_HOURS", Some("9223372036854775807"), || {
            assert!(load().is_err());
        });
    }

    #[test]
    #[serial]
    fn upload_limits_follow_max_upload_size() {
        temp_env::with_var_unset("MAX_UPLOAD_MIB", || {
            let config = load().unwrap();
            let limits: rocket::data::Limits = config
                .apply_limits(rocket::Config::figment())
                .extract_inner("limits")
                .unwrap();

            assert_eq!(limits.get("file"), Some(16.mebibytes()));
            assert_eq!(limits.get("data-form"), Some(17.mebibytes()));
            assert_eq!(limits.get("form"), Some(32.kibibytes()));
        });

        temp_env::with_var("MAX_UPLOAD_MIB", Some("0"), || {
            assert!(load().is_err());
        });
    }
}
