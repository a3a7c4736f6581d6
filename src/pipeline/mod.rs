//! Configuration pipeline: full bootstrap and hot reload.
//!
//! Bootstrap is a strictly sequential chain; each step consumes the output
//! of the one before it and any failure aborts the whole start:
//!
//! ```text
//!   1 settings ─► 2 channels ─► 3 plugin scopes ─► 4 client ─►
//!   5 plugin roster ─► 6 message templates ─► 7 plugin init ─► 8 connect
//! ```
//!
//! Hot reload repeats steps 3, 5 and 6 against the connected client, stages
//! the new plugin map, swaps it in only when every step succeeded, and then
//! re-initializes plugins. At most one reload runs at a time.

mod baseline;

use crate::auth::Authorizer;
use crate::bot::BotContext;
use crate::client::{Client, ClientConfig, ClientEvent};
use crate::db::{PluginChannel, RosterStore};
use crate::error::PipelineError;
use crate::plugins::{PluginLoader, PluginReport};
use crate::state::{BotSettings, ChannelTracker, ConfigHandle, PluginMap, RuntimeConfig};
use crate::telemetry::{StepTimer, spans};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{Instrument, error, info, warn};

/// Used for a blank `username` or `realname`.
const DEFAULT_IDENTITY: &str = "guacbot";

/// Startup options that come from the configuration file.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// CTCP VERSION reply.
    pub version: String,
    /// Port for servers stored without one.
    pub default_port: u16,
    pub default_friend_mode: char,
}

/// A bootstrapped, connected bot.
pub struct Session {
    pub ctx: Arc<BotContext>,
    /// Subscribed before connecting, so nothing from the server is missed.
    pub events: broadcast::Receiver<ClientEvent>,
    pub reports: Vec<PluginReport>,
}

pub struct Pipeline {
    store: Arc<dyn RosterStore>,
    loader: Arc<PluginLoader>,
    authorizer: Arc<dyn Authorizer>,
    reload_gate: Mutex<()>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RosterStore>,
        loader: Arc<PluginLoader>,
        authorizer: Arc<dyn Authorizer>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            loader,
            authorizer,
            reload_gate: Mutex::new(()),
            options,
        }
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Run the full bootstrap sequence, ending connected.
    pub async fn bootstrap(&self) -> Result<Session, PipelineError> {
        let settings = self
            .load_settings()
            .instrument(spans::pipeline_step(1, "settings"))
            .await?;

        let channels = self
            .load_channels()
            .instrument(spans::pipeline_step(2, "channels"))
            .await?;

        let plugin_channels = self
            .load_plugin_channels()
            .instrument(spans::pipeline_step(3, "plugin_channels"))
            .await?;

        let client = {
            let _span = spans::pipeline_step(4, "client").entered();
            let _timer = StepTimer::new("client");
            self.build_client(&settings, &channels)
        };

        let plugins = self
            .load_plugin_roster(&plugin_channels)
            .instrument(spans::pipeline_step(5, "plugins"))
            .await?;

        let plugins = self
            .load_messages(plugins)
            .instrument(spans::pipeline_step(6, "messages"))
            .await?;

        let ctx = Arc::new(BotContext {
            tracker: Arc::new(ChannelTracker::new(&settings.nick)),
            config: Arc::new(ConfigHandle::new(RuntimeConfig {
                settings,
                channels,
                plugins: Arc::new(plugins),
            })),
            client,
            store: Arc::clone(&self.store),
            authorizer: Arc::clone(&self.authorizer),
            default_friend_mode: self.options.default_friend_mode,
        });
        let events = ctx.client.subscribe();

        let reports = {
            let _timer = StepTimer::new("plugin_init");
            self.loader
                .load(&ctx)
                .instrument(spans::pipeline_step(7, "plugin_init"))
                .await
        };
        info!(
            loaded = reports.iter().filter(|r| r.is_ok()).count(),
            total = reports.len(),
            "Plugins initialized"
        );

        {
            let _timer = StepTimer::new("connect");
            ctx.client
                .connect()
                .instrument(spans::pipeline_step(8, "connect"))
                .await?;
        }

        Ok(Session {
            ctx,
            events,
            reports,
        })
    }

    /// Refresh the plugin map and re-initialize plugins without reconnecting.
    ///
    /// Fails with [`PipelineError::ReloadInProgress`] if another reload has
    /// not finished. On any other failure the current plugin map is left
    /// untouched.
    pub async fn reload(&self, ctx: &BotContext) -> Result<Vec<PluginReport>, PipelineError> {
        let _guard = self
            .reload_gate
            .try_lock()
            .map_err(|_| PipelineError::ReloadInProgress)?;

        let plugins = self.stage_plugins().await?;
        ctx.config.replace_plugins(plugins);
        info!("Plugin map replaced");

        Ok(self.loader.reload(ctx).await)
    }

    /// Run a reload requested from `channel` and report back there.
    pub async fn handle_reload_request(&self, ctx: &BotContext, channel: &str, requester: &str) {
        let reply = match self
            .reload(ctx)
            .instrument(spans::reload(Some(requester)))
            .await
        {
            Ok(reports) => {
                info!(requester = %requester, plugins = reports.len(), "Reload complete");
                let summary = reports
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("reloaded: {}", summary)
            }
            Err(PipelineError::ReloadInProgress) => {
                warn!(requester = %requester, "Reload rejected: already in progress");
                "reload already in progress".to_string()
            }
            Err(e) => {
                error!(requester = %requester, error = %e, code = e.error_code(), "Reload failed");
                format!("reload failed: {}", e)
            }
        };

        if let Err(e) = ctx.client.say(channel, &reply).await {
            warn!(channel = %channel, error = %e, "Failed to report reload result");
        }
    }

    /// Steps 3, 5 and 6 into a fresh map.
    async fn stage_plugins(&self) -> Result<PluginMap, PipelineError> {
        let plugin_channels = self
            .load_plugin_channels()
            .instrument(spans::pipeline_step(3, "plugin_channels"))
            .await?;
        let plugins = self
            .load_plugin_roster(&plugin_channels)
            .instrument(spans::pipeline_step(5, "plugins"))
            .await?;
        self.load_messages(plugins)
            .instrument(spans::pipeline_step(6, "messages"))
            .await
    }

    async fn load_settings(&self) -> Result<BotSettings, PipelineError> {
        let _timer = StepTimer::new("settings");
        let mut settings = self.store.load_settings().await?.ok_or_else(|| {
            PipelineError::ConfigurationIncomplete("no row in config table".into())
        })?;

        if settings.username.trim().is_empty() {
            settings.username = DEFAULT_IDENTITY.to_string();
        }
        if settings.realname.trim().is_empty() {
            settings.realname = DEFAULT_IDENTITY.to_string();
        }
        if settings.nick.trim().is_empty() || settings.server.trim().is_empty() {
            return Err(PipelineError::ConfigurationIncomplete(
                "nick and server are required".into(),
            ));
        }

        info!(nick = %settings.nick, server = %settings.server, "Settings loaded");
        Ok(settings)
    }

    async fn load_channels(&self) -> Result<Vec<String>, PipelineError> {
        let _timer = StepTimer::new("channels");
        let channels = self.store.load_channels().await?;
        if channels.is_empty() {
            return Err(PipelineError::ConfigurationIncomplete(
                "no enabled channels".into(),
            ));
        }
        info!(count = channels.len(), "Channels loaded");
        Ok(channels)
    }

    async fn load_plugin_channels(&self) -> Result<Vec<PluginChannel>, PipelineError> {
        let _timer = StepTimer::new("plugin_channels");
        let rows = self.store.load_plugin_channels().await?;
        info!(count = rows.len(), "Plugin channel scopes loaded");
        Ok(rows)
    }

    fn build_client(&self, settings: &BotSettings, channels: &[String]) -> Client {
        let (host, port) = ClientConfig::parse_server(&settings.server, self.options.default_port);
        let client = Client::new(ClientConfig {
            host,
            port,
            nick: settings.nick.clone(),
            username: settings.username.clone(),
            realname: settings.realname.clone(),
            channels: channels.to_vec(),
        });
        baseline::register(
            &client,
            settings.nickserv_password.clone(),
            self.options.version.clone(),
        );
        info!(host = %client.config().host, port = client.config().port, "Client constructed");
        client
    }

    /// Enabled plugins with their channel scope attached.
    async fn load_plugin_roster(
        &self,
        plugin_channels: &[PluginChannel],
    ) -> Result<PluginMap, PipelineError> {
        let _timer = StepTimer::new("plugins");
        let roster = self.store.load_plugin_roster().await?;
        if roster.is_empty() {
            return Err(PipelineError::ConfigurationIncomplete(
                "no plugins loaded".into(),
            ));
        }

        let plugins: PluginMap = roster
            .into_iter()
            .map(|mut record| {
                record.channels = plugin_channels
                    .iter()
                    .filter(|pc| pc.plugin_id == record.id)
                    .map(|pc| pc.channel.clone())
                    .collect();
                (record.filename.clone(), record)
            })
            .collect();

        info!(count = plugins.len(), "Plugin roster loaded");
        Ok(plugins)
    }

    /// Replace every plugin's templates with the stored ones.
    async fn load_messages(&self, mut plugins: PluginMap) -> Result<PluginMap, PipelineError> {
        let _timer = StepTimer::new("messages");
        let rows = self.store.load_plugin_messages().await?;

        for record in plugins.values_mut() {
            record.messages.clear();
        }

        let mut merged = 0usize;
        for row in rows {
            let Some(record) = plugins.get_mut(&row.plugin) else {
                warn!(plugin = %row.plugin, name = %row.name, "Message for unknown plugin skipped");
                continue;
            };
            record.messages.entry(row.name).or_default().push(row.message);
            merged += 1;
        }

        info!(count = merged, "Plugin messages loaded");
        Ok(plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AdminMasks;
    use crate::bot::testing::{FakeStore, create_test_context, drain, settings};
    use crate::plugins::PluginOutcome;
    use tokio::sync::Notify;

    fn options() -> PipelineOptions {
        PipelineOptions {
            version: "guacbot test".into(),
            default_port: 6667,
            default_friend_mode: 'v',
        }
    }

    fn pipeline(store: &FakeStore) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(store.clone()),
            Arc::new(PluginLoader::new()),
            Arc::new(AdminMasks::default()),
            options(),
        ))
    }

    fn seeded() -> FakeStore {
        FakeStore::default()
            .with_settings(settings())
            .with_channels(&["#x", "#y"])
            .with_plugins(&[(1, "greeter"), (2, "squire")])
            .with_plugin_channels(&[(1, "#x")])
            .with_messages(&[
                ("greeter", "hello", "hi"),
                ("greeter", "hello", "hey"),
                ("ghost", "boo", "boo!"),
            ])
    }

    #[tokio::test]
    async fn test_stage_attaches_scope_and_messages() {
        let store = seeded();
        let plugins = pipeline(&store).stage_plugins().await.unwrap();

        let greeter = &plugins["greeter"];
        assert_eq!(greeter.channels, vec!["#x".to_string()]);
        assert_eq!(greeter.messages["hello"], vec!["hi".to_string(), "hey".to_string()]);
        assert!(plugins["squire"].channels.is_empty());
        assert!(!plugins.contains_key("ghost"));
    }

    #[tokio::test]
    async fn test_bootstrap_requires_settings_channels_and_plugins() {
        let store = FakeStore::default();
        let err = pipeline(&store).bootstrap().await.err().unwrap();
        assert_eq!(err.error_code(), "configuration_incomplete");

        let store = FakeStore::default().with_settings(settings());
        let err = pipeline(&store).bootstrap().await.err().unwrap();
        assert!(matches!(err, PipelineError::ConfigurationIncomplete(m) if m.contains("channels")));

        let store = FakeStore::default()
            .with_settings(settings())
            .with_channels(&["#x"]);
        let err = pipeline(&store).bootstrap().await.err().unwrap();
        assert!(matches!(err, PipelineError::ConfigurationIncomplete(m) if m.contains("plugins")));
    }

    #[tokio::test]
    async fn test_blank_identity_defaults() {
        let mut blank = settings();
        blank.username = String::new();
        blank.realname = " ".into();
        let store = FakeStore::default().with_settings(blank);

        let settings = pipeline(&store).load_settings().await.unwrap();
        assert_eq!(settings.username, "guacbot");
        assert_eq!(settings.realname, "guacbot");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_plugins() {
        let store = seeded();
        let pipeline = pipeline(&store);
        let ctx = create_test_context(store.clone());
        pipeline.reload(&ctx).await.unwrap();
        let before = ctx.config.snapshot();

        store.set_plugins(&[(3, "other")]);
        store.fail_messages(true);
        let err = pipeline.reload(&ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));

        let after = ctx.config.snapshot();
        assert!(Arc::ptr_eq(&before.plugins, &after.plugins));
        assert_eq!(*before, *after);
    }

    #[tokio::test]
    async fn test_empty_roster_on_reload_keeps_previous_plugins() {
        let store = seeded();
        let pipeline = pipeline(&store);
        let ctx = create_test_context(store.clone());
        pipeline.reload(&ctx).await.unwrap();
        let before = ctx.config.snapshot();

        store.set_plugins(&[]);
        assert!(pipeline.reload(&ctx).await.is_err());
        assert_eq!(ctx.config.snapshot().plugins, before.plugins);
    }

    #[tokio::test]
    async fn test_concurrent_reload_is_rejected() {
        let store = seeded();
        let gate = Arc::new(Notify::new());
        store.stall_plugin_channels(Arc::clone(&gate));
        let pipeline = pipeline(&store);
        let ctx = Arc::new(create_test_context(store.clone()));

        let first = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let ctx = Arc::clone(&ctx);
            async move { pipeline.reload(&ctx).await }
        });
        // Let the first reload take the gate and stall.
        tokio::task::yield_now().await;

        let second = pipeline.reload(&ctx).await;
        assert!(matches!(second, Err(PipelineError::ReloadInProgress)));

        gate.notify_one();
        let reports = first.await.unwrap().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.outcome == PluginOutcome::NotFound));
        assert_eq!(ctx.config.snapshot().plugins.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let store = seeded();
        let pipeline = pipeline(&store);
        let ctx = create_test_context(store);

        pipeline.reload(&ctx).await.unwrap();
        let first = ctx.config.snapshot();
        pipeline.reload(&ctx).await.unwrap();
        assert_eq!(first.plugins, ctx.config.snapshot().plugins);
    }

    #[tokio::test]
    async fn test_reload_request_reports_to_channel() {
        let store = seeded();
        let pipeline = pipeline(&store);
        let ctx = create_test_context(store.clone());
        let mut outbound = ctx.client.detach().unwrap();

        pipeline.handle_reload_request(&ctx, "#x", "root").await;
        assert_eq!(
            drain(&mut outbound),
            vec!["PRIVMSG #x :reloaded: greeter: not found, squire: not found"]
        );

        store.fail_messages(true);
        pipeline.handle_reload_request(&ctx, "#x", "root").await;
        let lines = drain(&mut outbound);
        assert!(lines[0].starts_with("PRIVMSG #x :reload failed: "));
    }
}
