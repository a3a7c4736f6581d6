//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::validation::ValidationError;
use crate::state::parse_mode;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

impl ConfigError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "config_io",
            Self::Parse(_) => "config_parse",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Startup configuration.
///
/// Only what is needed before the database is reachable lives here; the bot's
/// identity, server, channels and plugins are all read from the database.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        super::validation::validate(self)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "guacbot.db".to_string()
}

/// Network defaults applied to the server address stored in the database.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Port used when the stored server has no `:port` suffix (default: 6667).
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    6667
}

/// Bot behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// CTCP VERSION reply.
    #[serde(default = "default_version")]
    pub version: String,
    /// Seconds between periodic permission scans (default: 300, 0 disables).
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    /// Mode granted by `af` when the command does not name one (default: "v").
    #[serde(default = "default_friend_mode")]
    pub default_friend_mode: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            scan_interval: default_scan_interval(),
            default_friend_mode: default_friend_mode(),
        }
    }
}

impl BotConfig {
    /// `default_friend_mode` as a mode letter. Validated at load time.
    pub fn friend_mode(&self) -> char {
        parse_mode(&self.default_friend_mode).unwrap_or('v')
    }
}

fn default_version() -> String {
    "https://github.com/prgmrbill/guacbot".to_string()
}

fn default_scan_interval() -> u64 {
    300
}

fn default_friend_mode() -> String {
    "v".to_string()
}

/// Administrator identification.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    /// Glob patterns over `nick!user@host`.
    #[serde(default)]
    pub masks: Vec<String>,
}
