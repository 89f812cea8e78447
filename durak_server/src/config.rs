//! Server configuration, read from the environment (and an optional `.env`).

use std::net::SocketAddr;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_STARTING_MAFS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. `DURAK_BIND`, or `0.0.0.0:$PORT`.
    pub bind: SocketAddr,
    pub game: GameSettings,
}

/// Knobs the dispatcher needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Balance given to a login that does not bring its own `mafs`.
    pub starting_mafs: u32,
    /// Send each player a snapshot with the opponent's hand and the stock face down.
    pub hide_opponent_hands: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            starting_mafs: DEFAULT_STARTING_MAFS,
            hide_opponent_hands: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Unparseable optional values fall
    /// back to their defaults; an unparseable `DURAK_BIND` is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let bind = match lookup("DURAK_BIND") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "DURAK_BIND".to_string(),
                reason: format!("{raw:?} is not an IP:PORT address"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], port)),
        };

        let game = GameSettings {
            starting_mafs: parse_or(&lookup, "DURAK_STARTING_MAFS", DEFAULT_STARTING_MAFS),
            hide_opponent_hands: parse_or(&lookup, "DURAK_HIDE_OPPONENT_HANDS", false),
        };

        Ok(ServerConfig { bind, game })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.starting_mafs == 0 {
            return Err(ConfigError::Invalid {
                var: "DURAK_STARTING_MAFS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
