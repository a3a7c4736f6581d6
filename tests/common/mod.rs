//! Integration test common infrastructure.
//!
//! Provides a fake IRC server and helpers for seeding the roster database.

pub mod server;

#[allow(unused_imports)]
pub use server::{BotConnection, FakeIrcServer};

use guacbot::db::Database;

/// In-memory database with the bot's identity and one channel.
pub async fn seeded_database(server: &str, channel: &str) -> anyhow::Result<Database> {
    let db = Database::new(":memory:").await?;

    sqlx::query(
        "INSERT INTO config (username, realname, server, nick, nickserv_pw) VALUES ('guac', '', ?, 'guacbot', 'hunter2')",
    )
    .bind(server)
    .execute(db.pool())
    .await?;

    sqlx::query("INSERT INTO channels (name) VALUES (?)")
        .bind(channel)
        .execute(db.pool())
        .await?;

    sqlx::query("INSERT INTO plugins (filename) VALUES ('squire')")
        .execute(db.pool())
        .await?;

    Ok(db)
}

/// Add a squire roster row.
pub async fn add_hostmask(
    db: &Database,
    hostmask: &str,
    mode: &str,
    is_friend: bool,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO squire_hostmasks (hostmask, mode, is_friend) VALUES (?, ?, ?)")
        .bind(hostmask)
        .bind(mode)
        .bind(is_friend)
        .execute(db.pool())
        .await?;
    Ok(())
}
