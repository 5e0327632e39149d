//! Runtime configuration.
//!
//! Loaded from TOML, every key optional:
//!
//! ```toml
//! api_url = "https://api.example.com"
//! fetch_concurrency = 10
//! request_timeout_ms = 30000
//! debounce_ms = 250
//! diff_exclusions = ["_metadata", "modifiedAt"]
//! ```
//!
//! `CWA_API_URL` and `CWA_FETCH_CONCURRENCY` override the file.

use crate::resource::DiffExclusions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ENV_API_URL: &str = "CWA_API_URL";
pub const ENV_FETCH_CONCURRENCY: &str = "CWA_FETCH_CONCURRENCY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid api_url `{0}`")]
    Url(String, #[source] url::ParseError),

    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CwaConfig {
    pub api_url: String,
    /// Fan-out limit at every level of the component-group traversal.
    pub fetch_concurrency: usize,
    pub request_timeout_ms: u64,
    pub debounce_ms: u64,
    /// Capacity of the store actor's request channel.
    pub store_buffer: usize,
    pub diff_exclusions: DiffExclusions,
    /// Wildcard topic for ComponentPosition creation; `{id}` is kept literally.
    pub position_topic: String,
    pub component_base_path: String,
    /// Delay before reopening a hub connection the server closed.
    pub reconnect_ms: u64,
}

impl Default for CwaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            fetch_concurrency: 10,
            request_timeout_ms: 30_000,
            debounce_ms: 250,
            store_buffer: 64,
            diff_exclusions: DiffExclusions::default(),
            position_topic: "/_/component_positions/{id}".to_string(),
            component_base_path: "/component/".to_string(),
            reconnect_ms: 3_000,
        }
    }
}

impl CwaConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file, applies environment overrides, then validates.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&content)?;
        let config = config.with_env_overrides()?;
        debug!(path = %path.display(), api_url = %config.api_url, "Config loaded");
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(api_url) = lookup(ENV_API_URL) {
            self.api_url = api_url;
        }
        if let Some(raw) = lookup(ENV_FETCH_CONCURRENCY) {
            self.fetch_concurrency = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{ENV_FETCH_CONCURRENCY} is not a number: {raw}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api_url).map_err(|e| ConfigError::Url(self.api_url.clone(), e))?;
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Validation(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.store_buffer == 0 {
            return Err(ConfigError::Validation(
                "store_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}
