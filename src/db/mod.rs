//! Database module for persistent storage.
//!
//! Provides async SQLite access using SQLx for everything the bot is
//! configured from:
//! - identity and server settings
//! - enabled channels and per-plugin channel scope
//! - the plugin roster and plugin message templates
//! - the friend/foe hostmask roster
//!
//! The rest of the bot only sees the [`RosterStore`] trait, so tests can swap
//! in stores that fail or stall on demand.

mod roster;

pub use roster::{PluginChannel, PluginMessage, RosterRepository};

use crate::error::StoreError;
use crate::state::{BotSettings, HostmaskEntry, PluginRecord};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read/write access to the bot's configuration and friend/foe roster.
///
/// Every operation is a single round trip; nothing spans a transaction.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// First row of the `config` table, if any.
    async fn load_settings(&self) -> Result<Option<BotSettings>, StoreError>;

    /// Names of enabled channels.
    async fn load_channels(&self) -> Result<Vec<String>, StoreError>;

    /// Enabled plugin/channel associations.
    async fn load_plugin_channels(&self) -> Result<Vec<PluginChannel>, StoreError>;

    /// Enabled plugins, without channel scope or messages attached.
    async fn load_plugin_roster(&self) -> Result<Vec<PluginRecord>, StoreError>;

    /// Message templates of enabled plugins, in row order.
    async fn load_plugin_messages(&self) -> Result<Vec<PluginMessage>, StoreError>;

    /// Enabled friend/foe hostmask entries.
    async fn load_hostmasks(&self) -> Result<Vec<HostmaskEntry>, StoreError>;

    /// Upsert a friend keyed by hostmask.
    async fn add_friend(&self, hostmask: &str, mode: char, nick: &str) -> Result<(), StoreError>;

    /// Mark the entry for `hostmask` disabled.
    async fn disable_friend(&self, hostmask: &str) -> Result<(), StoreError>;
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - a stalled store surfaces as unavailable instead of hanging.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // A uniquely named shared-cache memory database per call, so
            // parallel tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:guacbot-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await
                .map_err(StoreError::from_read)?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await
                .map_err(StoreError::from_read)?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await
            .map_err(StoreError::from_read)?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(StoreError::Unavailable(format!(
                "integrity check failed: {}",
                integrity_result
            )));
        }

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| StoreError::Schema(format!("migration failed: {}", e)))?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get roster repository.
    pub fn roster(&self) -> RosterRepository<'_> {
        RosterRepository::new(&self.pool)
    }
}

#[async_trait]
impl RosterStore for Database {
    async fn load_settings(&self) -> Result<Option<BotSettings>, StoreError> {
        self.roster().load_settings().await
    }

    async fn load_channels(&self) -> Result<Vec<String>, StoreError> {
        self.roster().load_channels().await
    }

    async fn load_plugin_channels(&self) -> Result<Vec<PluginChannel>, StoreError> {
        self.roster().load_plugin_channels().await
    }

    async fn load_plugin_roster(&self) -> Result<Vec<PluginRecord>, StoreError> {
        self.roster().load_plugin_roster().await
    }

    async fn load_plugin_messages(&self) -> Result<Vec<PluginMessage>, StoreError> {
        self.roster().load_plugin_messages().await
    }

    async fn load_hostmasks(&self) -> Result<Vec<HostmaskEntry>, StoreError> {
        self.roster().load_hostmasks().await
    }

    async fn add_friend(&self, hostmask: &str, mode: char, nick: &str) -> Result<(), StoreError> {
        self.roster().add_friend(hostmask, mode, nick).await
    }

    async fn disable_friend(&self, hostmask: &str) -> Result<(), StoreError> {
        self.roster().disable_friend(hostmask).await
    }
}
