//! guacbot - IRC channel bot
//!
//! Keeps channel privileges in line with a friend/foe hostmask roster kept in
//! SQLite, and reloads its plugins in place without dropping the connection.

pub mod auth;
pub mod bot;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod mask;
pub mod pipeline;
pub mod plugins;
pub mod state;
pub mod telemetry;
