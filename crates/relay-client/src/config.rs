//! Endpoint configuration.
//!
//! Stored as TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! relay_url = "ws://127.0.0.1:5000"
//! download_dir = "/home/me/Downloads"
//! loopback_candidates = false
//!
//! [transfer]
//! chunk_size = 65536
//! high_water_mark = 65536
//! poll_interval_ms = 10
//!
//! [[ice_servers]]
//! urls = ["stun:stun.l.google.com:19302"]
//! ```

use std::path::{Path, PathBuf};

use peerdrop_protocol::constants::{DEFAULT_RELAY_PORT, FILE_CHANNEL_LABEL};
use peerdrop_rtc::RtcOptions;
use peerdrop_session::{DEFAULT_STUN_URL, IceServer, NegotiatorConfig};
use peerdrop_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

use crate::ClientError;

/// Settings for one peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket URL of the signaling relay.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,

    /// Directory received files are written to. Unset keeps them in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Also gather ICE candidates on loopback interfaces.
    #[serde(default)]
    pub loopback_candidates: bool,
}

fn default_relay_url() -> String {
    format!("ws://127.0.0.1:{DEFAULT_RELAY_PORT}")
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun(DEFAULT_STUN_URL)]
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            transfer: TransferConfig::default(),
            ice_servers: default_ice_servers(),
            download_dir: None,
            loopback_candidates: false,
        }
    }
}

impl EndpointConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ClientError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the file at `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no endpoint config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Negotiation settings derived from this config.
    pub fn negotiator_config(&self) -> NegotiatorConfig {
        NegotiatorConfig {
            ice_servers: self.ice_servers.clone(),
            channel_label: FILE_CHANNEL_LABEL.to_string(),
        }
    }

    /// Options for the WebRTC connection factory.
    pub fn rtc_options(&self) -> RtcOptions {
        RtcOptions {
            include_loopback: self.loopback_candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EndpointConfig::from_toml("").unwrap();
        assert_eq!(config, EndpointConfig::default());
        assert_eq!(config.relay_url, "ws://127.0.0.1:5000");
        assert_eq!(config.transfer.chunk_size, 64 * 1024);
        assert_eq!(config.ice_servers[0].urls, vec![DEFAULT_STUN_URL.to_string()]);
        assert!(config.download_dir.is_none());
        assert!(!config.rtc_options().include_loopback);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = EndpointConfig::from_toml(
            r#"
relay_url = "ws://relay.example.org:9000"
download_dir = "/tmp/incoming"
loopback_candidates = true

[transfer]
high_water_mark = 1024

[[ice_servers]]
urls = ["turn:turn.example.org:3478"]
username = "user"
credential = "secret"
"#,
        )
        .unwrap();

        assert_eq!(config.relay_url, "ws://relay.example.org:9000");
        assert_eq!(config.download_dir, Some(PathBuf::from("/tmp/incoming")));
        assert!(config.rtc_options().include_loopback);
        assert_eq!(config.transfer.high_water_mark, 1024);
        assert_eq!(config.transfer.chunk_size, 64 * 1024);
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].username.as_deref(), Some("user"));

        let negotiation = config.negotiator_config();
        assert_eq!(negotiation.channel_label, "fileChannel");
        assert_eq!(negotiation.ice_servers, config.ice_servers);
    }

    #[test]
    fn invalid_document_is_config_error() {
        assert!(matches!(
            EndpointConfig::from_toml("relay_url = 5"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EndpointConfig::load(&dir.path().join("endpoint.toml")).unwrap();
        assert_eq!(config, EndpointConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoint.toml");
        std::fs::write(&path, "relay_url = \"ws://10.0.0.2:5000\"\n").unwrap();
        assert_eq!(
            EndpointConfig::load(&path).unwrap().relay_url,
            "ws://10.0.0.2:5000"
        );
    }
}
