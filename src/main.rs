//! guacbot - IRC channel bot
//!
//! Loads the startup file, opens the roster database, bootstraps the bot and
//! runs its event loop.

use guacbot::auth::AdminMasks;
use guacbot::bot::Bot;
use guacbot::config::Config;
use guacbot::db::Database;
use guacbot::pipeline::{Pipeline, PipelineOptions};
use guacbot::plugins::PluginLoader;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "guacbot.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, code = e.error_code(), "Failed to load config");
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.path,
        admins = config.admin.masks.len(),
        "Starting guacbot"
    );
    if config.admin.masks.is_empty() {
        warn!("No admin masks configured; administrator commands are disabled");
    }

    // Initialize database
    let db = Database::new(&config.database.path).await.map_err(|e| {
        error!(path = %config.database.path, error = %e, code = e.error_code(), "Failed to open database");
        e
    })?;

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(db),
        Arc::new(PluginLoader::with_builtin()),
        Arc::new(AdminMasks::new(config.admin.masks.clone())),
        PipelineOptions {
            version: config.bot.version.clone(),
            default_port: config.network.port,
            default_friend_mode: config.bot.friend_mode(),
        },
    ));

    let session = pipeline.bootstrap().await.map_err(|e| {
        error!(error = %e, code = e.error_code(), "Bootstrap failed");
        e
    })?;
    for report in &session.reports {
        info!(plugin = %report.plugin, outcome = %report, "Plugin status");
    }

    let bot = Bot::new(
        pipeline,
        session,
        Duration::from_secs(config.bot.scan_interval),
    );
    bot.run().await?;

    info!("guacbot stopped");
    Ok(())
}
