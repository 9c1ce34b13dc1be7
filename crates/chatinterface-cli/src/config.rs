//! Client configuration at `~/.chatinterface/config.toml`.
//!
//! Provides the default server and session tuning. CLI flags always
//! override config file values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatinterface_client::{CoordinatorConfig, ReconnectPolicy};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server to use when none is given and no login is saved (empty = none).
    #[serde(default)]
    pub server: String,

    /// Messages fetched per conversation on load.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Reconnect attempts before giving up.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Backoff base; attempt k waits `base * 2^k` seconds.
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_secs: u64,

    /// Timeout for REST calls and the socket handshake.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            history_limit: default_history_limit(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_secs: default_reconnect_base_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_history_limit() -> u32 {
    100
}

fn default_reconnect_attempts() -> u32 {
    4
}

fn default_reconnect_base_secs() -> u64 {
    4
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `~/.chatinterface/config.toml`
    pub fn default_path() -> std::path::PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".chatinterface")
            .join("config.toml")
    }

    /// Configured server, if any.
    pub fn server(&self) -> Option<&str> {
        Some(self.client.server.trim()).filter(|s| !s.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_secs)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            history_limit: self.client.history_limit,
            reconnect: ReconnectPolicy {
                max_attempts: self.client.reconnect_attempts,
                base_delay: Duration::from_secs(self.client.reconnect_base_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.server(), None);
        assert_eq!(cfg.coordinator_config(), CoordinatorConfig::default());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[client]\nserver = \"https://chat.example.com\"\nreconnect_attempts = 2\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server(), Some("https://chat.example.com"));
        let coordinator = cfg.coordinator_config();
        assert_eq!(coordinator.reconnect.max_attempts, 2);
        assert_eq!(coordinator.reconnect.base_delay, Duration::from_secs(4));
        assert_eq!(coordinator.history_limit, 100);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client\nserver = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn blank_server_counts_as_unset() {
        let mut cfg = Config::default();
        cfg.client.server = "   ".into();
        assert_eq!(cfg.server(), None);
    }
}
