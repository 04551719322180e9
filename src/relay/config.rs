// Relay configuration

use crate::relay::session::MAX_NAME_CHARS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the session registry and stream loops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long an unconnected session survives after authorize
    pub grace_period_ms: u64,
    /// Idle time on a stream before a heartbeat is written
    pub heartbeat_interval_ms: u64,
    /// Depth of each session's mailbox
    pub mailbox_capacity: usize,
    /// Maximum display name length, in characters (at most 20)
    pub max_name_chars: usize,
    /// Throughput log interval (0 disables it)
    pub stats_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            heartbeat_interval_ms: 1_000,
            mailbox_capacity: 1_000,
            max_name_chars: MAX_NAME_CHARS,
            stats_interval_ms: 1_000,
        }
    }
}

impl RelayConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: RelayConfig =
            serde_json::from_str(&raw).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            anyhow::bail!("mailbox_capacity must be at least 1");
        }
        if self.heartbeat_interval_ms == 0 {
            anyhow::bail!("heartbeat_interval_ms must be at least 1");
        }
        if self.max_name_chars == 0 || self.max_name_chars > MAX_NAME_CHARS {
            anyhow::bail!("max_name_chars must be between 1 and {}", MAX_NAME_CHARS);
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }
}
