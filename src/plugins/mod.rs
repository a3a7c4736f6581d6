//! Plugin trait and loader.
//!
//! Plugins declare which [`EventKind`]s they care about and receive only
//! those. The loader owns the live plugin instances: it creates them from a
//! registry of factories keyed by plugin identifier (the `plugins.filename`
//! column), initializes them, re-initializes them on reload, and fans events
//! out to them.

pub mod squire;

use crate::bot::BotContext;
use crate::error::PluginError;
use crate::events::{BotEvent, EventKind};
use crate::telemetry::spans;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info, trace, warn};

/// A bot plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Identifier matching the `plugins.filename` column.
    fn id(&self) -> &'static str;

    /// Event variants this plugin handles.
    fn interests(&self) -> &'static [EventKind];

    /// Called once after the plugin is loaded.
    async fn init(&self, ctx: &BotContext) -> Result<(), PluginError>;

    /// Called on every hot reload with the refreshed plugin map in place.
    async fn reload(&self, ctx: &BotContext) -> Result<(), PluginError> {
        self.init(ctx).await
    }

    async fn handle(&self, ctx: &BotContext, event: &BotEvent) -> Result<(), PluginError>;
}

/// Builds a fresh plugin instance.
pub type PluginFactory = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// What happened to one plugin during a load or reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    Loaded,
    Reloaded,
    /// Enabled in the store but no implementation is registered.
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReport {
    pub plugin: String,
    pub outcome: PluginOutcome,
}

impl PluginReport {
    fn new(plugin: &str, outcome: PluginOutcome) -> Self {
        Self {
            plugin: plugin.to_string(),
            outcome,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, PluginOutcome::Loaded | PluginOutcome::Reloaded)
    }
}

impl fmt::Display for PluginReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            PluginOutcome::Loaded => write!(f, "{}: loaded", self.plugin),
            PluginOutcome::Reloaded => write!(f, "{}: reloaded", self.plugin),
            PluginOutcome::NotFound => write!(f, "{}: not found", self.plugin),
            PluginOutcome::Failed(e) => write!(f, "{}: failed ({})", self.plugin, e),
        }
    }
}

/// Creates, initializes and dispatches to plugins.
pub struct PluginLoader {
    registry: HashMap<&'static str, PluginFactory>,
    active: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    /// Loader with no registered plugins.
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
            active: RwLock::new(Vec::new()),
        }
    }

    /// Loader with every plugin shipped in this crate registered.
    pub fn with_builtin() -> Self {
        let mut loader = Self::new();
        loader.register(squire::PLUGIN_ID, || {
            Arc::new(squire::Squire::new()) as Arc<dyn Plugin>
        });
        loader
    }

    pub fn register<F>(&mut self, id: &'static str, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.registry.insert(id, Box::new(factory));
    }

    /// Identifiers of the plugins currently running.
    pub fn active_ids(&self) -> Vec<&'static str> {
        self.active.read().iter().map(|p| p.id()).collect()
    }

    /// Instantiate and initialize every enabled plugin.
    ///
    /// A plugin that fails to initialize is reported and left out; the rest
    /// still load.
    pub async fn load(&self, ctx: &BotContext) -> Vec<PluginReport> {
        let config = ctx.config.snapshot();
        let mut reports = Vec::with_capacity(config.plugins.len());
        let mut loaded: Vec<Arc<dyn Plugin>> = Vec::new();

        for id in config.plugins.keys() {
            let Some(factory) = self.registry.get(id.as_str()) else {
                warn!(plugin = %id, "Plugin enabled but not registered");
                reports.push(PluginReport::new(id, PluginOutcome::NotFound));
                continue;
            };

            let plugin = factory();
            match plugin.init(ctx).instrument(spans::plugin(id)).await {
                Ok(()) => {
                    info!(plugin = %id, "Plugin loaded");
                    reports.push(PluginReport::new(id, PluginOutcome::Loaded));
                    loaded.push(plugin);
                }
                Err(e) => {
                    warn!(plugin = %id, error = %e, code = e.error_code(), "Plugin failed to initialize");
                    reports.push(PluginReport::new(id, PluginOutcome::Failed(e.to_string())));
                }
            }
        }

        *self.active.write() = loaded;
        reports
    }

    /// Re-initialize against the current plugin map.
    ///
    /// Running plugins that are still enabled get [`Plugin::reload`]; newly
    /// enabled ones are created and initialized; disabled ones are dropped.
    pub async fn reload(&self, ctx: &BotContext) -> Vec<PluginReport> {
        let config = ctx.config.snapshot();
        let previous: HashMap<&'static str, Arc<dyn Plugin>> = self
            .active
            .read()
            .iter()
            .map(|p| (p.id(), Arc::clone(p)))
            .collect();

        let mut reports = Vec::with_capacity(config.plugins.len());
        let mut next: Vec<Arc<dyn Plugin>> = Vec::new();

        for id in config.plugins.keys() {
            let span = spans::plugin(id);
            if let Some(plugin) = previous.get(id.as_str()) {
                match plugin.reload(ctx).instrument(span).await {
                    Ok(()) => {
                        info!(plugin = %id, "Plugin reloaded");
                        reports.push(PluginReport::new(id, PluginOutcome::Reloaded));
                    }
                    Err(e) => {
                        warn!(plugin = %id, error = %e, code = e.error_code(), "Plugin failed to reload");
                        reports.push(PluginReport::new(id, PluginOutcome::Failed(e.to_string())));
                    }
                }
                // Kept even on failure; it still holds its previous state.
                next.push(Arc::clone(plugin));
                continue;
            }

            let Some(factory) = self.registry.get(id.as_str()) else {
                warn!(plugin = %id, "Plugin enabled but not registered");
                reports.push(PluginReport::new(id, PluginOutcome::NotFound));
                continue;
            };

            let plugin = factory();
            match plugin.init(ctx).instrument(span).await {
                Ok(()) => {
                    info!(plugin = %id, "Plugin loaded");
                    reports.push(PluginReport::new(id, PluginOutcome::Loaded));
                    next.push(plugin);
                }
                Err(e) => {
                    warn!(plugin = %id, error = %e, code = e.error_code(), "Plugin failed to initialize");
                    reports.push(PluginReport::new(id, PluginOutcome::Failed(e.to_string())));
                }
            }
        }

        for id in previous.keys() {
            if !config.plugins.contains_key(*id) {
                info!(plugin = %id, "Plugin unloaded");
            }
        }

        *self.active.write() = next;
        reports
    }

    /// Deliver `event` to every interested, in-scope plugin.
    ///
    /// Errors are logged per plugin and never reach the other plugins.
    pub async fn dispatch(&self, ctx: &BotContext, event: &BotEvent) {
        let kind = event.kind();
        let plugins: Vec<Arc<dyn Plugin>> = self
            .active
            .read()
            .iter()
            .filter(|p| p.interests().contains(&kind))
            .cloned()
            .collect();

        for plugin in plugins {
            let id = plugin.id();

            // Fresh read per plugin: a reload may have landed while the
            // previous plugin was awaiting.
            if let Some(channel) = event.channel() {
                let config = ctx.config.snapshot();
                let in_scope = config.plugin(id).is_some_and(|r| r.in_scope(channel));
                if !in_scope {
                    trace!(plugin = id, channel = %channel, "Event out of plugin scope");
                    continue;
                }
            }

            match plugin.handle(ctx, event).instrument(spans::plugin(id)).await {
                Ok(()) => {}
                Err(PluginError::AuthorizationDenied) => {
                    debug!(plugin = id, "Command ignored: issuer is not an administrator");
                }
                Err(e) => {
                    warn!(plugin = id, error = %e, code = e.error_code(), "Plugin failed to handle event");
                }
            }
        }
    }
}
