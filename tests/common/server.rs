//! Fake IRC server.
//!
//! Accepts a single bot connection and lets the test script both sides of
//! the conversation line by line.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A listening fake server.
pub struct FakeIrcServer {
    listener: TcpListener,
}

impl FakeIrcServer {
    /// Bind to an ephemeral localhost port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    /// `host:port` to store in the bot's `config` table.
    pub fn address(&self) -> anyhow::Result<String> {
        Ok(self.listener.local_addr()?.to_string())
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<BotConnection> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(BotConnection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }
}

/// The server's end of the bot connection.
pub struct BotConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl BotConnection {
    /// Send a raw line to the bot.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one line from the bot, without the line ending.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a line with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("bot closed the connection");
        }
        Ok(line.trim_end().to_string())
    }

    /// Receive one line and check it.
    pub async fn expect(&mut self, expected: &str) -> anyhow::Result<()> {
        let line = self.recv().await?;
        anyhow::ensure!(line == expected, "expected {:?}, got {:?}", expected, line);
        Ok(())
    }

    /// Answer registration and the bot's own JOIN, as a server would.
    ///
    /// Expects the NickServ identification of the seeded database on the way.
    /// Leaves the bot opped in `channel` with `members` listed by NAMES.
    pub async fn welcome_into(&mut self, channel: &str, members: &str) -> anyhow::Result<()> {
        self.send_raw(":irc.test 001 guacbot :Welcome to TestNet guacbot")
            .await?;
        self.expect(&format!("JOIN {}", channel)).await?;
        self.expect("PRIVMSG nickserv :identify hunter2").await?;
        self.send_raw(&format!(":guacbot!guac@bot.host JOIN {}", channel))
            .await?;
        self.send_raw(&format!(
            ":irc.test 353 guacbot = {} :@guacbot {}",
            channel, members
        ))
        .await?;
        self.send_raw(&format!(":irc.test 366 guacbot {} :End of /NAMES list.", channel))
            .await?;
        Ok(())
    }
}
