//! Unified error handling for guacbot.
//!
//! The hierarchy mirrors the layers of the bot: the roster store, the network
//! client, plugins, and the configuration pipeline that ties them together.
//! Every enum exposes a static error code for log labeling.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

// ============================================================================
// Store Errors (roster / configuration tables)
// ============================================================================

/// Errors raised by the roster store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the query could not run.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A table, column or value did not have the expected shape.
    #[error("store schema error: {0}")]
    Schema(String),

    /// A write (upsert or soft-delete) failed.
    #[error("store write failed: {0}")]
    Write(String),
}

impl StoreError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Schema(_) => "store_schema",
            Self::Write(_) => "store_write",
        }
    }

    /// Classify a failed read.
    pub fn from_read(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => Self::Schema(err.to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message();
                if message.contains("no such table") || message.contains("no such column") {
                    Self::Schema(message.to_string())
                } else {
                    Self::Unavailable(message.to_string())
                }
            }
            _ => Self::Unavailable(err.to_string()),
        }
    }

    /// Classify a failed write. Any failure of a write is a write error.
    pub fn from_write(err: sqlx::Error) -> Self {
        Self::Write(err.to_string())
    }
}

// ============================================================================
// Client Errors (network collaborator)
// ============================================================================

/// Errors raised by the network client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("client is already connected")]
    AlreadyConnected,

    #[error("connection closed")]
    Closed,
}

impl ClientError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Codec(_) => "codec",
            Self::AlreadyConnected => "already_connected",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Plugin Errors
// ============================================================================

/// Errors raised while initializing a plugin or handling an event.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("no known hostmask for {0}")]
    UnresolvedNick(String),

    /// The issuer is not an administrator. Never reported to the user.
    #[error("authorization denied")]
    AuthorizationDenied,
}

impl PluginError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Client(e) => e.error_code(),
            Self::UnresolvedNick(_) => "unresolved_nick",
            Self::AuthorizationDenied => "authorization_denied",
        }
    }
}

// ============================================================================
// Pipeline Errors (bootstrap and hot reload)
// ============================================================================

/// Errors raised by the configuration pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lookup succeeded but left the configuration unusable.
    #[error("configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("a reload is already in progress")]
    ReloadInProgress,

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl PipelineError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::ConfigurationIncomplete(_) => "configuration_incomplete",
            Self::ReloadInProgress => "reload_in_progress",
            Self::Client(e) => e.error_code(),
        }
    }
}
