//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::{PipelineSettings, Rules};
use crate::util::rate_limit::INTENT_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines (`LOG_FORMAT=json`)
    pub log_json: bool,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,
    /// Inbound frames per second per connection
    pub intent_rate_limit: u32,

    /// Game rules for the arena
    pub rules: Rules,
    /// Period of movement ticks
    pub move_tick: Duration,
    /// Fixed seed for spawn placement
    pub spawn_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosted platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let defaults = Rules::default();
        let rules = Rules {
            world_width: parse_or(&lookup, "WORLD_WIDTH", defaults.world_width)?,
            world_height: parse_or(&lookup, "WORLD_HEIGHT", defaults.world_height)?,
            move_distance: parse_or(&lookup, "MOVE_DISTANCE", defaults.move_distance)?,
            move_time_ms: parse_or(&lookup, "MOVE_TIME_MS", defaults.move_time_ms)?,
            reload_time_ms: parse_or(&lookup, "RELOAD_TIME_MS", defaults.reload_time_ms)?,
            respawn_time_ms: parse_or(&lookup, "RESPAWN_TIME_MS", defaults.respawn_time_ms)?,
            sync_time_ms: parse_or(&lookup, "SYNC_TIME_MS", defaults.sync_time_ms)?,
            explosion_size: parse_or(&lookup, "EXPLOSION_SIZE", defaults.explosion_size)?,
        };

        if rules.world_width <= 0 || rules.world_height <= 0 {
            return Err(ConfigError::InvalidRules("world dimensions must be positive"));
        }
        if rules.move_distance < 0 || rules.explosion_size < 0 {
            return Err(ConfigError::InvalidRules("distances must not be negative"));
        }

        let move_tick_ms: u64 = parse_or(&lookup, "MOVE_TICK_MS", 16)?;
        if move_tick_ms == 0 {
            return Err(ConfigError::InvalidRules("MOVE_TICK_MS must be positive"));
        }

        let spawn_seed = match lookup("SPAWN_SEED") {
            Some(raw) => Some(parse("SPAWN_SEED", &raw)?),
            None => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),
            intent_rate_limit: parse_or(&lookup, "INTENT_RATE_LIMIT", INTENT_RATE_LIMIT)?,
            rules,
            move_tick: Duration::from_millis(move_tick_ms),
            spawn_seed,
        })
    }

    /// Settings for the game pipeline
    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            rules: self.rules.clone(),
            tick_interval: self.move_tick,
            spawn_seed: self.spawn_seed,
        }
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid game rules: {0}")]
    InvalidRules(&'static str),
}
