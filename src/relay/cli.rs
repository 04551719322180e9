// Command-line arguments for the relay binaries

use crate::relay::config::RelayConfig;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Session relay server
#[derive(Debug, Parser)]
#[command(name = "chatrelay-server")]
#[command(about = "Relay short messages between named, connected sessions")]
pub struct ServerCli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    pub listen: String,

    /// JSON config file (flags below override it)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Milliseconds an authorized session may wait before connecting
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Milliseconds of stream idleness before a heartbeat is sent
    #[arg(long)]
    pub heartbeat_ms: Option<u64>,

    /// Events buffered per connected session
    #[arg(long)]
    pub mailbox_capacity: Option<usize>,

    /// Throughput log interval in milliseconds (0 disables)
    #[arg(long)]
    pub stats_interval_ms: Option<u64>,
}

impl ServerCli {
    /// Resolve the effective relay configuration
    pub fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        if let Some(ms) = self.grace_ms {
            config.grace_period_ms = ms;
        }
        if let Some(ms) = self.heartbeat_ms {
            config.heartbeat_interval_ms = ms;
        }
        if let Some(capacity) = self.mailbox_capacity {
            config.mailbox_capacity = capacity;
        }
        if let Some(ms) = self.stats_interval_ms {
            config.stats_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Interactive chat client
#[derive(Debug, Parser)]
#[command(name = "chatrelay-chat")]
#[command(about = "Chat shell for a chatrelay server")]
pub struct ChatCli {
    /// Relay server address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    pub server: String,

    /// Display name (prompted for when omitted)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Session that typed lines are sent to
    #[arg(short, long)]
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let cli = ServerCli::try_parse_from(["chatrelay-server"]).unwrap();
        assert_eq!(cli.listen, "0.0.0.0:5000");
        assert_eq!(cli.relay_config().unwrap(), RelayConfig::default());
    }

    #[test]
    fn test_server_overrides() {
        let cli = ServerCli::try_parse_from([
            "chatrelay-server",
            "--listen",
            "127.0.0.1:7000",
            "--grace-ms",
            "1500",
            "--stats-interval-ms",
            "0",
        ])
        .unwrap();

        let config = cli.relay_config().unwrap();
        assert_eq!(config.grace_period_ms, 1500);
        assert_eq!(config.stats_interval(), None);
        assert_eq!(config.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn test_server_rejects_zero_capacity() {
        let cli =
            ServerCli::try_parse_from(["chatrelay-server", "--mailbox-capacity", "0"]).unwrap();
        assert!(cli.relay_config().is_err());
    }

    #[test]
    fn test_chat_requires_target() {
        assert!(ChatCli::try_parse_from(["chatrelay-chat"]).is_err());

        let cli = ChatCli::try_parse_from(["chatrelay-chat", "-n", "alice", "-t", "bob"]).unwrap();
        assert_eq!(cli.name.as_deref(), Some("alice"));
        assert_eq!(cli.target, "bob");
        assert_eq!(cli.server, "127.0.0.1:5000");
    }
}
