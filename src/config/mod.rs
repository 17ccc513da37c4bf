use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::price_infra::feed::FeedSettings;
use crate::price_infra::health::DEFAULT_PROBE_TIMEOUT;

pub mod loader;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    pub interval_secs: u64,
    pub probe_timeout_ms: u64,
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        HealthSettings {
            interval_secs: 30,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct KeeperSettings {
    /// Seconds between consensus rounds.
    pub interval_secs: u64,
}

impl Default for KeeperSettings {
    fn default() -> Self {
        KeeperSettings { interval_secs: 10 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub message_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let defaults = FeedSettings::default();
        FeedConfig {
            message_timeout_ms: defaults.message_timeout.as_millis() as u64,
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            reconnect_delay_ms: defaults.reconnect_delay.as_millis() as u64,
        }
    }
}

impl From<&FeedConfig> for FeedSettings {
    fn from(config: &FeedConfig) -> Self {
        FeedSettings {
            message_timeout: Duration::from_millis(config.message_timeout_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. "info" or "oracle_guard=debug".
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            json: false,
        }
    }
}
