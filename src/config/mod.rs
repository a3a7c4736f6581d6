//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and file loading
//! - [`validation`]: startup checks run by [`Config::load`]

mod types;
mod validation;

pub use types::{AdminConfig, BotConfig, Config, ConfigError, DatabaseConfig, NetworkConfig};
pub use validation::ValidationError;
