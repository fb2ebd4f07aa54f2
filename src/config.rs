//! Configuration loading.
//!
//! Settings come from a TOML file; the provider token can be overridden
//! from the environment. Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tasksync_core::reconcile::SignificanceThresholds;
use tasksync_core::taxonomy::{CategoryMapping, Taxonomy};
use thiserror::Error;

pub const CONFIG_ENV: &str = "TASKSYNC_CONFIG";
pub const TOKEN_ENV: &str = "TASKSYNC_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub reconcile: SignificanceThresholds,
    pub taxonomy: TaxonomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.todoist.com/rest/v2".into(),
            api_token: None,
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled passes; 0 disables the timer.
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub categories: Vec<CategoryMapping>,
}

impl Config {
    /// Resolve the config file: explicit path, then `TASKSYNC_CONFIG`, then
    /// the platform config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "tasksync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration. A missing file at the default location yields the
    /// defaults; a missing file that was asked for explicitly is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match Self::resolve_path(explicit) {
            Some(path) if path.exists() || explicit.is_some() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.provider.api_token = Some(token);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reconcile;
        if !(r.length_ratio_min > 0.0 && r.length_ratio_min <= 1.0 && r.length_ratio_max >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "length ratio bounds must satisfy 0 < min <= 1 <= max (got {} / {})",
                r.length_ratio_min, r.length_ratio_max
            )));
        }
        if !(0.0..=1.0).contains(&r.word_change_ratio) {
            return Err(ConfigError::Invalid(format!(
                "word_change_ratio must be within [0, 1] (got {})",
                r.word_change_ratio
            )));
        }
        self.build_taxonomy()?;
        Ok(())
    }

    pub fn build_taxonomy(&self) -> Result<Taxonomy, ConfigError> {
        Taxonomy::new(&self.taxonomy.categories).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The provider token, if the remote provider is configured at all.
    pub fn api_token(&self) -> Option<&str> {
        self.provider
            .api_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}
