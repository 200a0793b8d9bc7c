//! Configuration file
//!
//! Loaded from `config.toml` in the platform config directory, or from an
//! explicit path. A missing file means all defaults.
//!
//! ```toml
//! [relay]
//! listen_addr = "127.0.0.1:4000"
//! channel = "chatroom"
//! simulated_latency_ms = 0
//! embed_hub = true
//!
//! [hub]
//! addr = "127.0.0.1:4001"
//!
//! [client]
//! relay_url = "http://127.0.0.1:4000"
//! typing_reset_ms = 2000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_CHANNEL;

/// Default relay HTTP port
pub const DEFAULT_RELAY_PORT: u16 = 4000;

/// Default broadcast hub port
pub const DEFAULT_HUB_PORT: u16 = 4001;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelaySettings,
    pub hub: HubSettings,
    pub client: ClientSettings,
}

/// `[relay]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub listen_addr: SocketAddr,
    /// Broadcast channel the relay publishes to and clients subscribe to
    pub channel: String,
    /// Artificial delay before each message publish
    pub simulated_latency_ms: u64,
    /// Run the broadcast hub inside the relay process
    pub embed_hub: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RELAY_PORT)),
            channel: DEFAULT_CHANNEL.to_string(),
            simulated_latency_ms: 0,
            embed_hub: true,
        }
    }
}

impl RelaySettings {
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

/// `[hub]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Where the hub listens and where clients connect
    pub addr: SocketAddr,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_HUB_PORT)),
        }
    }
}

/// `[client]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub relay_url: String,
    /// Interval of the timer that resets the typing title
    pub typing_reset_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            relay_url: format!("http://127.0.0.1:{}", DEFAULT_RELAY_PORT),
            typing_reset_ms: 2000,
        }
    }
}

impl ClientSettings {
    pub fn typing_reset_interval(&self) -> Duration {
        Duration::from_millis(self.typing_reset_ms)
    }
}

impl Config {
    /// Platform config file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "anonchat", "anonchat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    ///
    /// A file that does not exist yields the defaults; a file that exists
    /// but does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.relay.channel.trim().is_empty() {
            return Err(Error::Config("relay.channel must not be empty".into()));
        }
        if self.client.typing_reset_ms == 0 {
            return Err(Error::Config("client.typing_reset_ms must be positive".into()));
        }
        if !self.client.relay_url.starts_with("http://")
            && !self.client.relay_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "client.relay_url must be an http(s) URL, got {}",
                self.client.relay_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.relay.listen_addr.port(), 4000);
        assert_eq!(config.relay.channel, "chatroom");
        assert_eq!(config.relay.simulated_latency(), Duration::ZERO);
        assert!(config.relay.embed_hub);
        assert_eq!(config.hub.addr.port(), 4001);
        assert_eq!(config.client.typing_reset_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [relay]
            simulated_latency_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.simulated_latency_ms, 2000);
        assert_eq!(config.relay.channel, "chatroom");
        assert_eq!(config.client, ClientSettings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::parse("[relay]\nchannel = \"\"").is_err());
        assert!(Config::parse("[client]\ntyping_reset_ms = 0").is_err());
        assert!(Config::parse("[client]\nrelay_url = \"localhost:4000\"").is_err());
        assert!(Config::parse("[hub]\naddr = \"not an addr\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hub]\naddr = \"127.0.0.1:9001\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.hub.addr.port(), 9001);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), Config::default());
    }
}
