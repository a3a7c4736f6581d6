//! Bot context and main event loop.
//!
//! [`BotContext`] is the one object every component is handed: the client,
//! the live configuration, the store, the channel tracker and the
//! administrator check. There is no other shared state.
//!
//! [`Bot::run`] folds each [`ClientEvent`] into the tracker, turns it into
//! [`BotEvent`]s, and dispatches those to plugins in delivery order.

use crate::auth::Authorizer;
use crate::client::{Client, ClientEvent, is_channel_name};
use crate::db::RosterStore;
use crate::error::ClientError;
use crate::events::{BotEvent, classify_message};
use crate::pipeline::{Pipeline, Session};
use crate::state::{ChannelTracker, ConfigHandle};
use crate::telemetry::spans;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, info, warn};

/// Everything plugins and the pipeline operate on.
#[derive(Clone)]
pub struct BotContext {
    pub client: Client,
    pub config: Arc<ConfigHandle>,
    pub store: Arc<dyn RosterStore>,
    pub tracker: Arc<ChannelTracker>,
    pub authorizer: Arc<dyn Authorizer>,
    /// Mode granted by `af` when none is given.
    pub default_friend_mode: char,
}

/// The running bot.
pub struct Bot {
    ctx: Arc<BotContext>,
    pipeline: Arc<Pipeline>,
    events: broadcast::Receiver<ClientEvent>,
    scan_interval: Option<Duration>,
}

impl Bot {
    /// `scan_interval` of zero disables periodic scans.
    pub fn new(pipeline: Arc<Pipeline>, session: Session, scan_interval: Duration) -> Self {
        Self {
            ctx: session.ctx,
            pipeline,
            events: session.events,
            scan_interval: (!scan_interval.is_zero()).then_some(scan_interval),
        }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Run until the connection drops or the process is interrupted.
    pub async fn run(mut self) -> Result<(), ClientError> {
        let mut ticker = self.scan_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Ok(ClientEvent::Disconnected { reason }) => {
                        warn!(reason = %reason, "Disconnected");
                        return Ok(());
                    }
                    Ok(event) => self.handle_client_event(event).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event loop lagged behind the connection");
                    }
                    Err(RecvError::Closed) => return Err(ClientError::Closed),
                },
                _ = next_tick(&mut ticker) => {
                    debug!("Periodic scan");
                    self.dispatch(BotEvent::Tick).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, quitting");
                    self.ctx.client.send("QUIT", ["Shutting down"]).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_client_event(&self, event: ClientEvent) -> Result<(), ClientError> {
        let update = self.ctx.tracker.apply(&event);

        for channel in update.who {
            debug!(channel = %channel, "Requesting hostmasks");
            self.ctx.client.send("WHO", [channel]).await?;
        }

        let mut events = update.events;
        if let ClientEvent::Privmsg {
            nick,
            hostmask,
            target,
            text,
        } = &event
            && is_channel_name(target)
        {
            events.extend(classify_message(
                &self.ctx.tracker,
                nick,
                hostmask.as_deref(),
                target,
                text,
            ));
        }

        for event in events {
            if let BotEvent::AddressedCommand(cmd) = &event
                && cmd.command == "reload"
            {
                self.spawn_reload(cmd.hostmask.as_deref(), &cmd.channel, &cmd.nick);
            }
            self.dispatch(event).await;
        }
        Ok(())
    }

    /// Run a hot reload as its own task so events keep flowing meanwhile.
    fn spawn_reload(&self, hostmask: Option<&str>, channel: &str, requester: &str) {
        if !self.ctx.authorizer.authorize(hostmask) {
            debug!(requester = %requester, "Reload ignored: issuer is not an administrator");
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let ctx = Arc::clone(&self.ctx);
        let channel = channel.to_string();
        let requester = requester.to_string();
        tokio::spawn(async move {
            pipeline
                .handle_reload_request(&ctx, &channel, &requester)
                .await;
        });
    }

    async fn dispatch(&self, event: BotEvent) {
        let span = spans::event(&format!("{:?}", event.kind()), event.channel());
        self.pipeline
            .loader()
            .dispatch(&self.ctx, &event)
            .instrument(span)
            .await;
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
