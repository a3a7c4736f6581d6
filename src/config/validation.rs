//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::mask;
use crate::state::parse_mode;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("database.path is required")]
    MissingDatabasePath,
    #[error("bot.default_friend_mode must be a single mode letter, got '{0}'")]
    InvalidFriendMode(String),
    #[error("admin.masks contains an invalid pattern: '{0}'")]
    InvalidAdminMask(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::MissingDatabasePath);
    }

    if parse_mode(&config.bot.default_friend_mode).is_none() {
        errors.push(ValidationError::InvalidFriendMode(
            config.bot.default_friend_mode.clone(),
        ));
    }

    for pattern in &config.admin.masks {
        if pattern.is_empty() || !mask::is_valid(pattern) {
            errors.push(ValidationError::InvalidAdminMask(pattern.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
