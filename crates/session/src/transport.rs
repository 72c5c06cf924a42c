//! Seams to the host's peer-connection stack and to the signaling relay.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use peerdrop_transfer::{ChannelEvent, DataChannel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::SessionError;

/// A boxed future returned by [`PeerConnection`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// One STUN/TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// A host peer connection.
///
/// Session descriptions and candidates are opaque JSON values; only the
/// host stack interprets them.
pub trait PeerConnection: Send + Sync {
    /// Creates the outbound data channel. Called by the initiator only.
    fn create_data_channel(&self, label: &str) -> TransportFuture<'_, ()>;

    fn create_offer(&self) -> TransportFuture<'_, Value>;

    fn create_answer(&self) -> TransportFuture<'_, Value>;

    fn set_local_description(&self, description: Value) -> TransportFuture<'_, ()>;

    fn set_remote_description(&self, description: Value) -> TransportFuture<'_, ()>;

    fn add_ice_candidate(&self, candidate: Value) -> TransportFuture<'_, ()>;

    fn close(&self) -> TransportFuture<'_, ()>;
}

/// Builds peer connections.
pub trait ConnectionFactory: Send + Sync {
    /// Creates a connection configured with `ice_servers`.
    ///
    /// Everything the connection reports afterwards is sent to `events`.
    fn create<'a>(
        &'a self,
        ice_servers: &'a [IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportFuture<'a, Box<dyn PeerConnection>>;
}

/// A data channel that has opened, plus its event stream.
pub struct ChannelHandle {
    pub channel: Arc<dyn DataChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("label", &self.channel.label())
            .field("open", &self.channel.is_open())
            .finish()
    }
}

/// Reported by a peer connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered.
    LocalCandidate(Value),
    /// The data channel (created locally or announced by the remote) opened.
    ChannelOpen(ChannelHandle),
    /// Connectivity dropped after being established.
    ConnectivityLost,
    /// The connection failed.
    Failed(String),
}

/// A signaling message addressed to one remote peer.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundSignal {
    Offer { receiver: String, sdp: Value },
    Answer { receiver: String, sdp: Value },
    IceCandidate { receiver: String, candidate: Value },
}

impl OutboundSignal {
    pub fn receiver(&self) -> &str {
        match self {
            Self::Offer { receiver, .. }
            | Self::Answer { receiver, .. }
            | Self::IceCandidate { receiver, .. } => receiver,
        }
    }
}

/// Hands signaling messages to the relay. Never waits.
pub trait SignalSink: Send + Sync {
    fn send_signal(&self, signal: OutboundSignal) -> Result<(), SessionError>;
}

impl SignalSink for mpsc::UnboundedSender<OutboundSignal> {
    fn send_signal(&self, signal: OutboundSignal) -> Result<(), SessionError> {
        self.send(signal)
            .map_err(|_| SessionError::Signaling("signal channel closed".into()))
    }
}
