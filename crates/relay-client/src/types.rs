use std::path::PathBuf;

use peerdrop_session::SessionState;
use peerdrop_transfer::{ProgressUpdate, ReceivedFile};
use serde_json::Value;

/// Signaling traffic delivered by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// Full list of peers currently connected to the relay.
    PeersUpdate(Vec<String>),
    Offer { from: String, sdp: Value },
    Answer { from: String, sdp: Value },
    IceCandidate { from: String, candidate: Value },
    /// The relay connection is gone. Nothing else follows.
    Disconnected,
}

/// Action requested by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCommand {
    /// Start a session to the given peer as the initiator.
    Connect(String),
    /// Append files to the outgoing queue.
    Enqueue(Vec<PathBuf>),
    /// Send everything queued over the open channel.
    StartTransfer,
    Shutdown,
}

/// Reported to the UI.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// Other peers on the relay, excluding this endpoint.
    Peers(Vec<String>),
    Status { state: SessionState, text: String },
    Progress(ProgressUpdate),
    FileReceived {
        file: ReceivedFile,
        /// Where the file was written, when a download directory is configured.
        saved_to: Option<PathBuf>,
    },
    /// Every queued file was sent.
    TransferComplete { files: usize },
    TransferFailed(String),
    /// The relay connection dropped. Open channels keep working, but no new
    /// session can be negotiated.
    RelayDisconnected,
}
