//! Relay configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/peerdrop/relay.toml`
//! - Windows: `%APPDATA%/peerdrop/relay.toml`
//!
//! The `PORT` environment variable overrides the configured port.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use peerdrop_protocol::constants::DEFAULT_RELAY_PORT;
use peerdrop_relay::ServerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`RelayConfig::port`].
const PORT_ENV: &str = "PORT";

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// TCP port for WebSocket signaling and the health probe.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl RelayConfig {
    /// Loads configuration from disk (creating a default file if missing),
    /// then applies the `PORT` override.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();
        let config = Self::load_from(&path)?;
        config.with_port_override(std::env::var(PORT_ENV).ok().as_deref())
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn with_port_override(mut self, port: Option<&str>) -> anyhow::Result<Self> {
        if let Some(raw) = port {
            self.port = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {PORT_ENV} value {raw:?}: {e}"))?;
        }
        Ok(self)
    }

    /// Listener settings for the relay server.
    pub fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let bind: IpAddr = self
            .bind
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {:?}: {e}", self.bind))?;
        Ok(ServerConfig {
            bind,
            port: self.port,
        })
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("peerdrop")
            .join("relay.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("peerdrop").join("relay.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/peerdrop/relay.toml")
    }
}
