//! Roster repository.
//!
//! Queries behind [`super::RosterStore`]: bot settings, channels, the plugin
//! roster with its channel scope and message templates, and the squire
//! friend/foe hostmasks.

use crate::error::StoreError;
use crate::state::{BotSettings, HostmaskEntry, PluginRecord, parse_mode};
use sqlx::SqlitePool;

/// An enabled plugin/channel association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginChannel {
    pub plugin_id: i64,
    pub channel: String,
}

/// A message template row, identified by its plugin's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub plugin: String,
    pub name: String,
    pub message: String,
}

/// Repository for roster and configuration queries.
pub struct RosterRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RosterRepository<'a> {
    /// Create a new roster repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the first row of the `config` table.
    pub async fn load_settings(&self) -> Result<Option<BotSettings>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT username, realname, server, nick, nickserv_pw
            FROM config
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await
        .map_err(StoreError::from_read)?;

        Ok(row.map(
            |(username, realname, server, nick, nickserv_password)| BotSettings {
                username,
                realname,
                server,
                nick,
                nickserv_password,
            },
        ))
    }

    /// Load the names of enabled channels.
    pub async fn load_channels(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT name
            FROM channels
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(StoreError::from_read)
    }

    /// Load enabled plugin/channel associations.
    pub async fn load_plugin_channels(&self) -> Result<Vec<PluginChannel>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT plugin_id, channel
            FROM plugin_channels
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(StoreError::from_read)?;

        Ok(rows
            .into_iter()
            .map(|(plugin_id, channel)| PluginChannel { plugin_id, channel })
            .collect())
    }

    /// Load enabled plugins.
    pub async fn load_plugin_roster(&self) -> Result<Vec<PluginRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, bool)>(
            r#"
            SELECT id, filename, enabled
            FROM plugins
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(StoreError::from_read)?;

        Ok(rows
            .into_iter()
            .map(|(id, filename, enabled)| PluginRecord {
                enabled,
                ..PluginRecord::new(id, filename)
            })
            .collect())
    }

    /// Load message templates of enabled plugins.
    pub async fn load_plugin_messages(&self) -> Result<Vec<PluginMessage>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT p.filename, pm.name, pm.message
            FROM plugin_messages pm
            JOIN plugins p ON p.id = pm.plugin_id
            WHERE p.enabled = 1
            ORDER BY pm.id
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(StoreError::from_read)?;

        Ok(rows
            .into_iter()
            .map(|(plugin, name, message)| PluginMessage {
                plugin,
                name,
                message,
            })
            .collect())
    }

    /// Load enabled friend/foe hostmasks.
    pub async fn load_hostmasks(&self) -> Result<Vec<HostmaskEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, bool)>(
            r#"
            SELECT hostmask, mode, is_friend
            FROM squire_hostmasks
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(StoreError::from_read)?;

        rows.into_iter()
            .map(|(pattern, mode, is_friend)| {
                let mode = parse_mode(&mode).ok_or_else(|| {
                    StoreError::Schema(format!("invalid mode {:?} for {}", mode, pattern))
                })?;
                Ok(HostmaskEntry {
                    pattern,
                    mode,
                    is_friend,
                })
            })
            .collect()
    }

    /// Insert or re-enable a friend entry keyed by hostmask.
    pub async fn add_friend(&self, hostmask: &str, mode: char, nick: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO squire_hostmasks (hostmask, mode, nick, is_friend, enabled)
            VALUES (?, ?, ?, 1, 1)
            ON CONFLICT(hostmask) DO UPDATE SET
                mode = excluded.mode,
                nick = excluded.nick,
                is_friend = 1,
                enabled = 1
            "#,
        )
        .bind(hostmask)
        .bind(mode.to_string())
        .bind(nick)
        .execute(self.pool)
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    /// Soft-delete the entry for `hostmask`. Missing entries are not an error.
    pub async fn disable_friend(&self, hostmask: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE squire_hostmasks SET enabled = 0 WHERE hostmask = ?")
            .bind(hostmask)
            .execute(self.pool)
            .await
            .map_err(StoreError::from_write)?;

        Ok(())
    }
}
