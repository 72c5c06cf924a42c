//! Conversions between the negotiator's JSON values and `webrtc` types.
//!
//! Descriptions and candidates use the browser shapes:
//! `{"type", "sdp"}` and `{"candidate", "sdpMid", "sdpMLineIndex",
//! "usernameFragment"}`.

use peerdrop_session::{IceServer, SessionError};
use serde_json::Value;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub(crate) fn ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Parses an offer or answer.
pub(crate) fn description_from_json(value: Value) -> Result<RTCSessionDescription, SessionError> {
    let description: RTCSessionDescription = serde_json::from_value(value)
        .map_err(|e| SessionError::InvalidDescription(e.to_string()))?;
    match description.sdp_type {
        RTCSdpType::Offer | RTCSdpType::Answer => Ok(description),
        other => Err(SessionError::InvalidDescription(format!(
            "unsupported description type {other:?}"
        ))),
    }
}

pub(crate) fn description_to_json(description: &RTCSessionDescription) -> Result<Value, SessionError> {
    serde_json::to_value(description).map_err(|e| SessionError::Transport(e.to_string()))
}

pub(crate) fn candidate_from_json(value: Value) -> Result<RTCIceCandidateInit, SessionError> {
    serde_json::from_value(value)
        .map_err(|e| SessionError::Transport(format!("invalid ICE candidate: {e}")))
}

pub(crate) fn candidate_to_json(candidate: &RTCIceCandidateInit) -> Result<Value, SessionError> {
    serde_json::to_value(candidate).map_err(|e| SessionError::Transport(e.to_string()))
}
