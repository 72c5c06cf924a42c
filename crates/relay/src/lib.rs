//! WebSocket signaling relay for peerdrop.
//!
//! Accepts any number of peer connections, assigns each an opaque id,
//! keeps the live set in a [`PeerRegistry`], broadcasts presence on every
//! connect/disconnect, and forwards offer / answer / ICE candidate
//! messages between exactly two named peers. The relay never looks inside
//! a session description or candidate.

mod connection;
mod health;
mod registry;
mod router;
mod server;

pub use connection::{RelayConnection, SendError, Sender};
pub use registry::PeerRegistry;
pub use router::{DropReason, RouteOutcome, route};
pub use server::{RelayServer, ServerConfig};

/// Per-connection send buffer capacity.
///
/// Signaling traffic is a handful of messages per session plus one
/// presence broadcast per connect/disconnect, so a modest buffer suffices.
/// A full buffer drops the message rather than stalling the router.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out reading request head")]
    HandshakeTimeout,
}
