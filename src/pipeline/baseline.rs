//! Behaviors every client gets before it connects.
//!
//! On registration the bot identifies with NickServ (when a password is
//! configured), and CTCP VERSION queries get the configured version string.

use crate::client::{Client, ClientEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Subscribe the baseline listener. Must run before [`Client::connect`].
pub(super) fn register(client: &Client, nickserv_password: String, version: String) {
    let mut events = client.subscribe();
    let client = client.clone();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Baseline listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let result = match event {
                ClientEvent::Registered { server, nick, .. } => {
                    info!(server = %server, nick = %nick, "Registered");
                    if nickserv_password.is_empty() {
                        Ok(())
                    } else {
                        debug!("Identifying with NickServ");
                        client
                            .say("nickserv", &format!("identify {}", nickserv_password))
                            .await
                    }
                }
                ClientEvent::CtcpVersion { nick, .. } => {
                    debug!(nick = %nick, "Answering CTCP VERSION");
                    client
                        .notice(&nick, &format!("\x01VERSION {}\x01", version))
                        .await
                }
                ClientEvent::Disconnected { .. } => break,
                _ => Ok(()),
            };

            if let Err(e) = result {
                warn!(error = %e, "Baseline reply failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_identify_and_version_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new(ClientConfig {
            host: "127.0.0.1".into(),
            port,
            nick: "guacbot".into(),
            username: "guacbot".into(),
            realname: "guacbot".into(),
            channels: vec![],
        });
        register(&client, "hunter2".into(), "guacbot 1.0".into());
        client.connect().await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK guacbot");
        lines.next_line().await.unwrap().unwrap();

        write
            .write_all(b":irc.test 001 guacbot :Welcome\r\n")
            .await
            .unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "PRIVMSG nickserv :identify hunter2"
        );

        write
            .write_all(b":alice!a@host PRIVMSG guacbot :\x01VERSION\x01\r\n")
            .await
            .unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "NOTICE alice :\x01VERSION guacbot 1.0\x01"
        );
    }
}
