//! # Configuration
//!
//! TOML configuration for the growth engine and its operator CLI. Every
//! section has serde defaults, so a partial file (or an empty one) loads.
//!
//! ## Configuration Structure
//!
//! - [`StorageConfig`] - where the sled database lives
//! - [`CacheConfig`] - snapshot cache toggle and expiry
//! - [`EventsConfig`] - which event sink receives growth events
//! - [`GrowthRules`] - caps and per-level point grants
//! - [`EngineConfig`] - per-operation deadline
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paragon_engine::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Data dir: {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data/growth"
//!
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//!
//! [events]
//! sink = "journal"
//!
//! [rules]
//! attribute_cap = 25
//! paragon_stat_cap = 100
//! max_paragon_experience_per_grant = 10000000
//! prestige_required_level = 50
//!
//! [engine]
//! request_timeout_ms = 50
//!
//! [logging]
//! level = "info"
//! file = "paragon-engine.log"
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

pub use crate::growth::types::GrowthRules;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub rules: GrowthRules,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// sled page cache size in bytes; sled's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/growth".to_string(),
            cache_capacity_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Snapshot lifetime in seconds
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Where published growth events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSinkKind {
    /// `info` lines on the `events` log target
    Log,
    /// Append to the `growth_events` tree of the store
    #[default]
    Journal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventsConfig {
    #[serde(default)]
    pub sink: EventSinkKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for a single engine operation, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("paragon-engine.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            bail!("storage.data_dir must not be empty");
        }
        if self.rules.attribute_cap == 0 {
            bail!("rules.attribute_cap must be at least 1");
        }
        if self.rules.paragon_stat_cap == 0 {
            bail!("rules.paragon_stat_cap must be at least 1");
        }
        if self.rules.max_paragon_experience_per_grant == 0 {
            bail!("rules.max_paragon_experience_per_grant must be at least 1");
        }
        if self.rules.prestige_required_level < 2 {
            bail!("rules.prestige_required_level must be at least 2");
        }
        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            bail!("cache.ttl_seconds must be positive when the cache is enabled");
        }
        if self.engine.request_timeout_ms == 0 {
            bail!("engine.request_timeout_ms must be positive");
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(anyhow!("logging.level '{}' is not a log level", other)),
        }
    }
}
