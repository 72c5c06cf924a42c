//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use peerdrop_relay_client::EndpointConfig;

#[derive(Debug, Parser)]
#[command(name = "peerdrop-peer", version, about = "Send and receive files through a peerdrop relay")]
pub struct Args {
    /// Endpoint config file (TOML). Missing files mean defaults.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Relay WebSocket URL.
    #[arg(long, env = "PEERDROP_RELAY")]
    pub relay: Option<String>,

    /// Directory received files are saved to.
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Peer to connect to.
    #[arg(long)]
    pub connect: Option<String>,

    /// Files to send once connected. Requires --connect.
    #[arg(requires = "connect")]
    pub files: Vec<PathBuf>,
}

/// What the endpoint does after joining the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Wait for incoming sessions until Ctrl-C.
    Listen,
    /// Open a session to `remote` and send `files` over it.
    Send { remote: String, files: Vec<PathBuf> },
}

impl Args {
    /// Loads the config file, then applies command-line overrides.
    pub fn endpoint_config(&self) -> anyhow::Result<EndpointConfig> {
        let mut config = match &self.config {
            Some(path) => EndpointConfig::load(path)?,
            None => EndpointConfig::default(),
        };
        if let Some(relay) = &self.relay {
            config.relay_url = relay.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
        Ok(config)
    }

    pub fn plan(&self) -> Plan {
        match &self.connect {
            Some(remote) => Plan::Send {
                remote: remote.clone(),
                files: self.files.clone(),
            },
            None => Plan::Listen,
        }
    }
}
