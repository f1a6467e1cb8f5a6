//! Configuration management for Localcast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

pub const DEFAULT_GBP_API_BASE: &str = "https://mybusinessbusinessinformation.googleapis.com/v1";
pub const DEFAULT_GBP_POSTS_API_BASE: &str = "https://mybusiness.googleapis.com/v4";
pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub google: Option<GoogleConfig>,
    pub instagram: Option<InstagramConfig>,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub enabled: bool,
    /// Business-information API (accounts / locations listing)
    #[serde(default = "default_gbp_api_base")]
    pub api_base: String,
    /// Local-post creation API
    #[serde(default = "default_gbp_posts_api_base")]
    pub posts_api_base: String,
    /// Preferred location resource name (e.g. "locations/67890").
    /// When unset the resolver takes the first listed location.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub enabled: bool,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep cycles
    pub poll_interval: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { poll_interval: 300 }
    }
}

fn default_gbp_api_base() -> String {
    DEFAULT_GBP_API_BASE.to_string()
}

fn default_gbp_posts_api_base() -> String {
    DEFAULT_GBP_POSTS_API_BASE.to_string()
}

fn default_graph_api_base() -> String {
    DEFAULT_GRAPH_API_BASE.to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/localcast/localcast.db".to_string(),
            },
            google: Some(GoogleConfig {
                enabled: true,
                api_base: default_gbp_api_base(),
                posts_api_base: default_gbp_posts_api_base(),
                location: None,
            }),
            instagram: Some(InstagramConfig {
                enabled: true,
                api_base: default_graph_api_base(),
            }),
            sweep: SweepConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LOCALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("localcast").join("config.toml"))
}
