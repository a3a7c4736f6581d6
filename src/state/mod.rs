//! State management module.
//!
//! Contains the runtime configuration assembled by the pipeline and the
//! channel tracker fed by network events.
//!
//! [`RuntimeConfig`] is immutable once built. The pipeline publishes a new
//! one through [`ConfigHandle`]; readers hold an `Arc` snapshot and take a
//! fresh one after every await point.

pub mod tracker;

pub use tracker::{ChannelTracker, MemberModes, TrackerUpdate};

use crate::client::casemap::irc_eq;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identity and server settings from the `config` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    pub username: String,
    pub realname: String,
    /// `host` or `host:port`.
    pub server: String,
    pub nick: String,
    /// NickServ password; empty disables identification.
    pub nickserv_password: String,
}

/// A single mode letter, written as `v` or `+v`.
pub(crate) fn parse_mode(raw: &str) -> Option<char> {
    let mut chars = raw.trim().trim_start_matches('+').chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
        _ => None,
    }
}

/// A friend/foe hostmask pattern from the `squire_hostmasks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostmaskEntry {
    /// Glob pattern over `nick!user@host`.
    pub pattern: String,
    /// Privilege mode letter granted to friends / revoked from foes.
    pub mode: char,
    pub is_friend: bool,
}

/// One enabled plugin and everything the pipeline attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PluginRecord {
    pub id: i64,
    /// Plugin identifier (the `plugins.filename` column).
    pub filename: String,
    pub enabled: bool,
    /// Channels the plugin is enabled in. Empty means every channel.
    pub channels: Vec<String>,
    /// Message templates keyed by message name, in row order.
    pub messages: BTreeMap<String, Vec<String>>,
}

impl PluginRecord {
    pub fn new(id: i64, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Whether the plugin should act in `channel`.
    pub fn in_scope(&self, channel: &str) -> bool {
        self.channels.is_empty()
            || self
                .channels
                .iter()
                .any(|c| irc_eq(c, channel))
    }

    /// Pick one of the templates stored under `name` at random.
    pub fn message(&self, name: &str) -> Option<&str> {
        self.messages
            .get(name)?
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

/// Plugins keyed by identifier.
pub type PluginMap = BTreeMap<String, PluginRecord>;

/// Fully populated runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub settings: BotSettings,
    pub channels: Vec<String>,
    pub plugins: Arc<PluginMap>,
}

impl RuntimeConfig {
    pub fn plugin(&self, id: &str) -> Option<&PluginRecord> {
        self.plugins.get(id)
    }
}

/// Shared, atomically replaceable runtime configuration.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<RuntimeConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current configuration. Do not hold across an await point.
    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.current.read().clone()
    }

    /// Replace the plugin map wholesale.
    pub fn replace_plugins(&self, plugins: PluginMap) {
        let mut current = self.current.write();
        let next = RuntimeConfig {
            settings: current.settings.clone(),
            channels: current.channels.clone(),
            plugins: Arc::new(plugins),
        };
        *current = Arc::new(next);
    }
}
