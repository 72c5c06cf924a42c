//! Peer-side client for the peerdrop relay.
//!
//! [`RelayClient`] holds the WebSocket to the signaling relay and turns its
//! traffic into [`SignalEvent`] values. [`Endpoint`] ties that client to a
//! session negotiator and the transfer engine, taking commands from the UI
//! and reporting status, progress and received files back to it.

mod config;
pub mod endpoint;
mod pumps;
pub mod types;
pub mod ws_client;

pub use config::EndpointConfig;
pub use endpoint::{Endpoint, EndpointHandle};
pub use types::{EndpointCommand, EndpointEvent, SignalEvent};
pub use ws_client::RelayClient;

/// Errors from the relay client and endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("session error: {0}")]
    Session(#[from] peerdrop_session::SessionError),

    #[error("timed out waiting for the relay")]
    Timeout,

    #[error("connection closed")]
    Closed,
}
