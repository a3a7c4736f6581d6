//! IRC client connection.
//!
//! The client is built first and connected later: listeners subscribe to
//! [`ClientEvent`]s and outbound commands queue up until [`Client::connect`]
//! opens the socket and starts the I/O task.
//!
//! ```text
//!   send()/say()/mode() ──► mpsc queue ──┐
//!                                         ▼
//!                          ┌──────────────────────────┐
//!                          │ I/O task (Framed lines)  │◄──► server
//!                          └──────────────────────────┘
//!                                         │ PING → PONG, 001 → JOIN
//!                                         ▼
//!                        broadcast<ClientEvent> ──► listeners
//! ```

pub mod casemap;
mod event;
mod message;

pub use event::{ClientEvent, is_channel_name};
pub use message::{Message, ParseError, Prefix};

use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

/// Outbound queue depth before `send` applies backpressure.
const OUTBOUND_QUEUE_SIZE: usize = 512;

/// Event fan-out depth; slow listeners past this lag and skip events.
const EVENT_QUEUE_SIZE: usize = 1024;

/// Longest inbound line accepted (tags included).
const MAX_LINE_LENGTH: usize = 8191;

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// Channels joined once registration completes.
    pub channels: Vec<String>,
}

impl ClientConfig {
    /// Split `host` or `host:port`, falling back to `default_port`.
    pub fn parse_server(server: &str, default_port: u16) -> (String, u16) {
        match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => match port.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (server.to_string(), default_port),
            },
            _ => (server.to_string(), default_port),
        }
    }
}

struct Inner {
    config: ClientConfig,
    current_nick: RwLock<String>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    events: broadcast::Sender<ClientEvent>,
}

/// Handle to the IRC connection. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client. Nothing touches the network until [`Client::connect`].
    pub fn new(config: ClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (events, _) = broadcast::channel(EVENT_QUEUE_SIZE);
        Self {
            inner: Arc::new(Inner {
                current_nick: RwLock::new(config.nick.clone()),
                config,
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                events,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Nick confirmed by the server (or the configured one before registration).
    pub fn current_nick(&self) -> String {
        self.inner.current_nick.read().clone()
    }

    /// Register a listener. Events emitted before this call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Take the outbound queue without connecting.
    #[cfg(test)]
    pub(crate) fn detach(&self) -> Option<mpsc::Receiver<String>> {
        self.inner.outbound_rx.lock().take()
    }

    /// Queue a raw protocol line.
    pub async fn send_raw(&self, line: impl Into<String>) -> Result<(), ClientError> {
        self.inner
            .outbound_tx
            .send(line.into())
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Queue a command with parameters.
    pub async fn send<I, S>(&self, command: &str, params: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send_raw(Message::new(command, params).to_string())
            .await
    }

    /// PRIVMSG to a channel or user.
    pub async fn say(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.send("PRIVMSG", [target, text]).await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.send("NOTICE", [target, text]).await
    }

    /// Set or unset a member mode: `mode("#x", "+o", "bob")`.
    pub async fn mode(&self, channel: &str, change: &str, nick: &str) -> Result<(), ClientError> {
        self.send("MODE", [channel, change, nick]).await
    }

    /// Open the connection, register, and start the I/O task.
    ///
    /// Can only be called once per client.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let outbound_rx = self
            .inner
            .outbound_rx
            .lock()
            .take()
            .ok_or(ClientError::AlreadyConnected)?;

        let config = &self.inner.config;
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        info!(host = %config.host, port = config.port, "Connected to IRC server");

        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        framed
            .send(Message::new("NICK", [config.nick.as_str()]).to_string())
            .await?;
        framed
            .send(
                Message::new(
                    "USER",
                    [
                        config.username.as_str(),
                        "0",
                        "*",
                        config.realname.as_str(),
                    ],
                )
                .to_string(),
            )
            .await?;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let reason = run_io(&inner, framed, outbound_rx).await;
            warn!(reason = %reason, "IRC connection closed");
            let _ = inner.events.send(ClientEvent::Disconnected { reason });
        });

        Ok(())
    }
}

/// Pump lines in both directions until either side closes.
async fn run_io(
    inner: &Inner,
    mut framed: Framed<TcpStream, LinesCodec>,
    mut outbound_rx: mpsc::Receiver<String>,
) -> String {
    loop {
        tokio::select! {
            line = outbound_rx.recv() => {
                let Some(line) = line else {
                    return "client dropped".to_string();
                };
                debug!(line = %line, "->");
                if let Err(e) = framed.send(line).await {
                    return e.to_string();
                }
            }
            result = framed.next() => {
                let line = match result {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => return e.to_string(),
                    None => return "server closed the connection".to_string(),
                };
                debug!(line = %line, "<-");

                let msg = match line.parse::<Message>() {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(error = %e, "Skipping line");
                        continue;
                    }
                };

                if msg.command == "PING" {
                    let pong = Message::new("PONG", msg.params.clone()).to_string();
                    if let Err(e) = framed.send(pong).await {
                        return e.to_string();
                    }
                    continue;
                }

                let Some(event) = ClientEvent::from_message(&msg) else {
                    continue;
                };

                match &event {
                    ClientEvent::Registered { nick, .. } => {
                        *inner.current_nick.write() = nick.clone();
                        for channel in &inner.config.channels {
                            let join = Message::new("JOIN", [channel.as_str()]).to_string();
                            if let Err(e) = framed.send(join).await {
                                return e.to_string();
                            }
                        }
                    }
                    ClientEvent::NickChange { old, new } => {
                        let mut current = inner.current_nick.write();
                        if casemap::irc_eq(&current, old) {
                            *current = new.clone();
                        }
                    }
                    ClientEvent::Disconnected { reason } => return reason.clone(),
                    _ => {}
                }

                // No listeners is fine; events are fire-and-forget.
                let _ = inner.events.send(event);
            }
        }
    }
}
