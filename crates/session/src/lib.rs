//! Session negotiation between two peers.
//!
//! A [`Negotiator`] drives the offer / answer / ICE candidate handshake for
//! one endpoint. The host's peer-connection stack sits behind the
//! [`PeerConnection`] and [`ConnectionFactory`] traits, signaling goes out
//! through a [`SignalSink`], and everything the transport reports comes
//! back in as [`TransportEvent`] values handled on the endpoint's task.

pub mod memory;
mod negotiator;
mod state;
mod transport;

pub use negotiator::{Negotiator, NegotiatorConfig, SessionEvent};
pub use state::{Role, SessionRecord, SessionState};
pub use transport::{
    ChannelHandle, ConnectionFactory, IceServer, OutboundSignal, PeerConnection, SignalSink,
    TransportEvent, TransportFuture,
};

/// Default public STUN server.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Errors produced while negotiating a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("no peer connection")]
    NoConnection,
}
