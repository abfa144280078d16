//! Configuration management for trailbook.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then `TRAILBOOK_` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::report::DEFAULT_PROFILE_POINTS;
use crate::units::UnitSystem;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "trailbook";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "routes.db";

/// Default export directory name inside the data directory.
const EXPORT_DIR_NAME: &str = "exports";

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "TRAILBOOK_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRAILBOOK_`, sections split on `__`)
/// 2. TOML config file at `~/.config/trailbook/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Export configuration.
    pub export: ExportConfig,
    /// Remote route source configuration.
    pub remote: RemoteConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/trailbook/routes.db`
    pub database_path: Option<PathBuf>,
}

/// Export-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory exports are written to.
    /// Defaults to `~/.local/share/trailbook/exports`
    pub output_dir: Option<PathBuf>,
    /// Unit system for summaries and reports.
    pub units: UnitSystem,
    /// Maximum number of samples in report elevation charts.
    pub profile_max_points: usize,
}

/// Remote route source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL route documents are fetched from.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with requests.
    pub user_agent: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None, // Will be resolved to default at runtime
            units: UnitSystem::default(),
            profile_max_points: DEFAULT_PROFILE_POINTS,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://routes.trailbook.app/v1".to_string(),
            timeout_secs: 30,
            user_agent: concat!("trailbook/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and the environment apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.export.profile_max_points < 2 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "export.profile_max_points must be at least 2, got {}",
                    self.export.profile_max_points
                ),
            });
        }

        let url = self.remote.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::ConfigValidation {
                message: format!("remote.base_url must be an http(s) URL, got '{url}'"),
            });
        }

        if self.remote.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "remote.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.remote.user_agent.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "remote.user_agent must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(EXPORT_DIR_NAME))
    }

    /// Get the remote request timeout as a Duration.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.export.output_dir.is_none());
        assert_eq!(config.export.units, UnitSystem::Metric);
        assert_eq!(config.export.profile_max_points, DEFAULT_PROFILE_POINTS);
        assert!(config.remote.base_url.starts_with("https://"));
        assert_eq!(config.remote.timeout_secs, 30);
        assert!(config.remote.user_agent.starts_with("trailbook/"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_profile_points() {
        let mut config = Config::default();
        config.export.profile_max_points = 1;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("profile_max_points"));
    }

    #[test]
    fn test_validate_base_url() {
        let mut config = Config::default();
        config.remote.base_url = "ftp://routes.example.org".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("remote.base_url"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.remote.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let mut config = Config::default();
        config.remote.user_agent = "  ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("routes.db"));
        assert!(path.to_string_lossy().contains("trailbook"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_output_dir_default() {
        let config = Config::default();
        assert!(config.output_dir().ends_with("exports"));
    }

    #[test]
    fn test_remote_timeout() {
        let config = Config::default();
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("trailbook"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
database_path = "/data/hikes.db"

[export]
units = "imperial"
profile_max_points = 120

[remote]
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/data/hikes.db"));
        assert_eq!(config.export.units, UnitSystem::Imperial);
        assert_eq!(config.export.profile_max_points, 120);
        assert_eq!(config.remote.timeout_secs, 5);
        // Untouched keys keep their defaults.
        assert_eq!(config.remote.base_url, RemoteConfig::default().base_url);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[export]\nprofile_max_points = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_reports_type_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[export]\nunits = \"furlongs\"\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("profile_max_points"));
        assert!(json.contains("\"units\":\"metric\""));
    }
}
