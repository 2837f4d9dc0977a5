//! Application configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) yields a working setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::NseConfig;
use crate::metrics::{ExpirySelection, RunRequest, DEFAULT_EXPIRY_COUNT, DEFAULT_LOOKBACK_DAYS};
use crate::viewer::{DEFAULT_VRP_THRESHOLD, VRP_THRESHOLD_RANGE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub provider: NseConfig,

    #[serde(default)]
    pub viewer: ViewerSettings,
}

/// What a metrics run computes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Index name for price history
    #[serde(default = "default_symbol_index")]
    pub symbol_index: String,

    /// Option symbol for chains and stored rows
    #[serde(default = "default_symbol_option")]
    pub symbol_option: String,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Number of upcoming expiries evaluated
    #[serde(default = "default_expiry_count")]
    pub expiry_count: usize,
}

fn default_symbol_index() -> String {
    "NIFTY 50".to_string()
}

fn default_symbol_option() -> String {
    "NIFTY".to_string()
}

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_expiry_count() -> usize {
    DEFAULT_EXPIRY_COUNT
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            symbol_index: default_symbol_index(),
            symbol_option: default_symbol_option(),
            lookback_days: default_lookback_days(),
            expiry_count: default_expiry_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long a viewer load is reused; 0 disables caching
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vrp_repository.db")
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl StoreSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default = "default_vrp_threshold")]
    pub vrp_threshold: f64,
}

fn default_vrp_threshold() -> f64 {
    DEFAULT_VRP_THRESHOLD
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            vrp_threshold: default_vrp_threshold(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    ///
    /// An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.lookback_days <= 0 {
            return Err(ConfigError::Invalid(format!(
                "run.lookback_days must be positive, got {}",
                self.run.lookback_days
            )));
        }
        if self.run.symbol_option.trim().is_empty() || self.run.symbol_index.trim().is_empty() {
            return Err(ConfigError::Invalid("run symbols must not be empty".to_string()));
        }
        let (lo, hi) = VRP_THRESHOLD_RANGE;
        if !(lo..=hi).contains(&self.viewer.vrp_threshold) {
            return Err(ConfigError::Invalid(format!(
                "viewer.vrp_threshold must be within {lo}..={hi}, got {}",
                self.viewer.vrp_threshold
            )));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Run request for `run_date` from the `run` section.
    pub fn run_request(&self, run_date: chrono::NaiveDate) -> RunRequest {
        RunRequest::new(&self.run.symbol_index, &self.run.symbol_option, run_date)
            .with_lookback(self.run.lookback_days)
            .with_expiries(ExpirySelection::Next(self.run.expiry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.run.symbol_index, "NIFTY 50");
        assert_eq!(config.run.symbol_option, "NIFTY");
        assert_eq!(config.run.lookback_days, 30);
        assert_eq!(config.run.expiry_count, 3);
        assert_eq!(config.store.db_path, PathBuf::from("vrp_repository.db"));
        assert_eq!(config.store.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.provider.timeout_secs, 30);
        assert_eq!(config.viewer.vrp_threshold, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [run]
            symbol_option = "BANKNIFTY"
            symbol_index = "NIFTY BANK"

            [store]
            cache_ttl_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.run.symbol_option, "BANKNIFTY");
        assert_eq!(config.run.lookback_days, 30);
        assert_eq!(config.store.cache_ttl(), Duration::ZERO);
        assert_eq!(config.store.db_path, PathBuf::from("vrp_repository.db"));
        assert_eq!(config.provider.base_url, "https://www.nseindia.com");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[viewer]\nvrp_threshold = 2.5\n[provider]\ntimeout_secs = 10").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.viewer.vrp_threshold, 2.5);
        assert_eq!(config.provider.timeout_secs, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(Some(dir.path().join("absent.toml").as_path()));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
        assert!(AppConfig::load(None).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_lookback = AppConfig::from_toml("[run]\nlookback_days = 0").unwrap();
        assert!(matches!(bad_lookback.validate(), Err(ConfigError::Invalid(_))));

        let bad_threshold = AppConfig::from_toml("[viewer]\nvrp_threshold = 12.0").unwrap();
        assert!(bad_threshold.validate().is_err());

        assert!(matches!(
            AppConfig::from_toml("[run]\nlookback_days = \"thirty\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_run_request_from_settings() {
        let config = AppConfig::from_toml("[run]\nexpiry_count = 2\nlookback_days = 45").unwrap();
        let run_date = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        let request = config.run_request(run_date);

        assert_eq!(request.symbol_option, "NIFTY");
        assert_eq!(request.lookback_days, 45);
        assert_eq!(request.expiries, ExpirySelection::Next(2));
        assert_eq!(request.run_date, run_date);
    }
}
