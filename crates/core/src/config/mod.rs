//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RESFETCH_*)
//! 2. TOML config file (if RESFETCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RESFETCH_*)
/// 2. TOML config file (if RESFETCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database (structured tier).
    ///
    /// Set via RESFETCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for the flat-file fallback tier.
    ///
    /// Set via RESFETCH_FLAT_STORE_DIR environment variable.
    #[serde(default = "default_flat_store_dir")]
    pub flat_store_dir: PathBuf,

    /// Whether responses are persisted at all.
    ///
    /// Set via RESFETCH_CACHE_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via RESFETCH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to accept per candidate response.
    ///
    /// Set via RESFETCH_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Per-candidate HTTP timeout in milliseconds.
    ///
    /// Set via RESFETCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects a candidate may follow.
    ///
    /// Set via RESFETCH_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Hosts that receive cookies; subdomains match too.
    ///
    /// Set via RESFETCH_TRUSTED_ORIGINS environment variable, either as a
    /// comma-separated list (`cdn.example,img.example`) or in figment array
    /// syntax (`[cdn.example, img.example]`).
    #[serde(default, deserialize_with = "host_list")]
    pub trusted_origins: Vec<String>,

    /// Freshness window applied when a call does not set its own lifetime.
    ///
    /// Set via RESFETCH_DEFAULT_LIFETIME_MS environment variable.
    #[serde(default)]
    pub default_lifetime_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./resfetch-cache.sqlite")
}

fn default_flat_store_dir() -> PathBuf {
    PathBuf::from("./resfetch-cache")
}

fn default_user_agent() -> String {
    "resfetch/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn host_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HostList {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match HostList::deserialize(deserializer)? {
        HostList::Joined(hosts) => hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect(),
        HostList::List(hosts) => hosts,
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            flat_store_dir: default_flat_store_dir(),
            cache_enabled: true,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            trusted_origins: Vec::new(),
            default_lifetime_ms: 0,
        }
    }
}

impl AppConfig {
    /// Per-candidate timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default freshness window as Duration.
    pub fn default_lifetime(&self) -> Duration {
        Duration::from_millis(self.default_lifetime_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RESFETCH_`
    /// 2. TOML file from `RESFETCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RESFETCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RESFETCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
