use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for a pong response (or any incoming message).
///
/// Acts as a read deadline on both ends of a relay connection: if nothing
/// arrives within this window the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings (must be well below [`WS_PONG_WAIT`]).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Maximum signaling message size in bytes (1 MB).
///
/// Session descriptions with many candidates stay far below this.
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default relay TCP port.
pub const DEFAULT_RELAY_PORT: u16 = 5000;

/// Path of the liveness probe served by the relay.
pub const HEALTH_PATH: &str = "/health";

/// Body returned by the liveness probe.
pub const HEALTH_BODY: &str = "Signaling server is running.";

/// Control marker closing one file on the data channel.
pub const EOF_MARKER: &str = "EOF";

/// Label of the data channel created by the initiator.
pub const FILE_CHANNEL_LABEL: &str = "fileChannel";

/// Signaling message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Relay -> peer
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "peers-update")]
    PeersUpdate,

    // Peer <-> relay <-> peer
    #[serde(rename = "offer")]
    Offer,
    #[serde(rename = "answer")]
    Answer,
    #[serde(rename = "ice-candidate")]
    IceCandidate,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::IceCandidate).unwrap(),
            "\"ice-candidate\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::PeersUpdate).unwrap(),
            "\"peers-update\""
        );
        assert_eq!(serde_json::to_string(&MessageType::Offer).unwrap(), "\"offer\"");
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"answer\"").unwrap();
        assert_eq!(mt, MessageType::Answer);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"some_future_type\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }

    #[test]
    fn ping_period_below_pong_wait() {
        assert!(WS_PING_PERIOD < WS_PONG_WAIT);
    }
}
