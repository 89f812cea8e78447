//! Websocket server for two-player Durak rooms.
//!
//! The transport lives in [`routes`]; everything it receives goes through the
//! [`GameServer`] dispatcher, which owns the room and user registries.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod registry;
pub mod routes;

pub use config::{ConfigError, GameSettings, ServerConfig};
pub use dispatch::{GameServer, Outbox};
