use serde::Deserialize;
use std::time::Duration;

use crate::dispatcher::ReconnectPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file written by the monitor.
    pub path: String,
    pub max_pool_size: u32,
    /// How often the watcher checks `PRAGMA user_version` for new records.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Max number of live messages buffered per subscriber (slow run views may lag).
    pub broadcast_capacity: usize,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Consecutive failed connection attempts before a live view gives up; unset retries forever.
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

impl ChannelConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.poll_interval_ms > 0,
            "database.poll_interval_ms must be > 0, got {}",
            self.database.poll_interval_ms
        );
        anyhow::ensure!(
            self.channel.broadcast_capacity > 0,
            "channel.broadcast_capacity must be > 0, got {}",
            self.channel.broadcast_capacity
        );
        anyhow::ensure!(
            self.channel.reconnect_initial_ms > 0,
            "channel.reconnect_initial_ms must be > 0, got {}",
            self.channel.reconnect_initial_ms
        );
        anyhow::ensure!(
            self.channel.reconnect_max_ms >= self.channel.reconnect_initial_ms,
            "channel.reconnect_max_ms must be >= channel.reconnect_initial_ms, got {} < {}",
            self.channel.reconnect_max_ms,
            self.channel.reconnect_initial_ms
        );
        anyhow::ensure!(
            self.channel.reconnect_max_attempts != Some(0),
            "channel.reconnect_max_attempts must be > 0 when set"
        );
        Ok(())
    }
}
