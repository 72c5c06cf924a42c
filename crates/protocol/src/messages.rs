use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Peer -> relay
// ---------------------------------------------------------------------------

/// Session offer sent by the initiator.
///
/// `sdp` is the host platform's session description, carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: serde_json::Value,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
}

/// Session answer sent by the responder.
///
/// The relay ignores any sender claimed here and uses the connection's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub sdp: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
}

/// Connectivity hint discovered locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub candidate: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
}

// ---------------------------------------------------------------------------
// Relay -> peer
// ---------------------------------------------------------------------------

/// Offer as delivered to its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferForward {
    pub sdp: serde_json::Value,
    pub sender: String,
}

/// Answer as delivered to its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerForward {
    pub sdp: serde_json::Value,
    pub sender: String,
}

/// Connectivity hint as delivered to its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateForward {
    pub candidate: serde_json::Value,
    pub sender: String,
}

/// Full list of live peer ids, broadcast on every connect/disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersUpdate {
    pub peers: Vec<String>,
}

/// First message on every relay connection: the id assigned to this peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub peer_id: String,
}

/// Returns the addressed receiver, treating an empty string as unset.
pub fn receiver_id(receiver: &Option<String>) -> Option<&str> {
    receiver.as_deref().filter(|r| !r.is_empty())
}
