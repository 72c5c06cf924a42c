//! Stateless routing of signaling messages between two named peers.
//!
//! Delivery is best-effort and fire-and-forget: nothing is ever reported
//! back to the sender, failures are only logged.

use peerdrop_protocol::constants::MessageType;
use peerdrop_protocol::envelope::Message;
use peerdrop_protocol::messages::{
    AnswerForward, AnswerRequest, IceCandidateForward, IceCandidateRequest, OfferForward,
    OfferRequest, receiver_id,
};
use serde::Serialize;

use crate::registry::PeerRegistry;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Forwarded to the named peer's send buffer.
    Delivered { to: String },
    /// Not forwarded.
    Dropped(DropReason),
}

/// Why a message was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The payload did not name a receiver.
    MissingReceiver,
    /// The named receiver is not connected.
    UnknownReceiver(String),
    /// The receiver's connection is full or closing.
    ReceiverUnavailable(String),
    /// The payload did not match the message type.
    MalformedPayload,
    /// Peers may not send this message type.
    NotRoutable,
}

/// Routes one message received from `from`.
pub fn route(registry: &PeerRegistry, from: &str, msg: &Message) -> RouteOutcome {
    match msg.msg_type {
        MessageType::Offer => route_offer(registry, from, msg),
        MessageType::Answer => route_answer(registry, from, msg),
        MessageType::IceCandidate => route_candidate(registry, from, msg),
        _ => {
            tracing::warn!(peer = %from, msg_type = ?msg.msg_type, "ignoring non-routable message");
            RouteOutcome::Dropped(DropReason::NotRoutable)
        }
    }
}

fn route_offer(registry: &PeerRegistry, from: &str, msg: &Message) -> RouteOutcome {
    let Some(req) = parse::<OfferRequest>(from, msg) else {
        return RouteOutcome::Dropped(DropReason::MalformedPayload);
    };
    // Offers name their sender in the payload; fall back to the connection.
    let sender = if req.sender.is_empty() {
        from.to_string()
    } else {
        req.sender
    };
    let Some(receiver) = receiver_id(&req.receiver) else {
        tracing::error!(%sender, "offer has no receiver");
        return RouteOutcome::Dropped(DropReason::MissingReceiver);
    };
    tracing::info!(%sender, %receiver, "offer");
    let fwd = OfferForward { sdp: req.sdp, sender };
    forward(registry, receiver, MessageType::Offer, &fwd, true)
}

fn route_answer(registry: &PeerRegistry, from: &str, msg: &Message) -> RouteOutcome {
    let Some(req) = parse::<AnswerRequest>(from, msg) else {
        return RouteOutcome::Dropped(DropReason::MalformedPayload);
    };
    let Some(receiver) = receiver_id(&req.receiver) else {
        tracing::debug!(sender = %from, "answer has no receiver");
        return RouteOutcome::Dropped(DropReason::MissingReceiver);
    };
    tracing::info!(sender = %from, %receiver, "answer");
    let fwd = AnswerForward {
        sdp: req.sdp,
        sender: from.to_string(),
    };
    // Answers are not presence-checked; an absent receiver is swallowed quietly.
    forward(registry, receiver, MessageType::Answer, &fwd, false)
}

fn route_candidate(registry: &PeerRegistry, from: &str, msg: &Message) -> RouteOutcome {
    let Some(req) = parse::<IceCandidateRequest>(from, msg) else {
        return RouteOutcome::Dropped(DropReason::MalformedPayload);
    };
    let Some(receiver) = receiver_id(&req.receiver) else {
        tracing::error!(sender = %from, "ICE candidate has no receiver");
        return RouteOutcome::Dropped(DropReason::MissingReceiver);
    };
    tracing::debug!(sender = %from, %receiver, "ICE candidate");
    let fwd = IceCandidateForward {
        candidate: req.candidate,
        sender: from.to_string(),
    };
    forward(registry, receiver, MessageType::IceCandidate, &fwd, true)
}

fn parse<T: for<'de> serde::Deserialize<'de>>(from: &str, msg: &Message) -> Option<T> {
    match msg.parse_payload::<T>() {
        Ok(Some(p)) => Some(p),
        Ok(None) => {
            tracing::warn!(peer = %from, msg_type = ?msg.msg_type, "message has no payload");
            None
        }
        Err(e) => {
            tracing::warn!(peer = %from, msg_type = ?msg.msg_type, "malformed payload: {e}");
            None
        }
    }
}

fn forward<T: Serialize>(
    registry: &PeerRegistry,
    receiver: &str,
    msg_type: MessageType,
    payload: &T,
    warn_if_absent: bool,
) -> RouteOutcome {
    let Some(target) = registry.get(receiver) else {
        if warn_if_absent {
            tracing::warn!(%receiver, ?msg_type, "receiver not connected, dropping");
        } else {
            tracing::debug!(%receiver, ?msg_type, "receiver not connected, dropping");
        }
        return RouteOutcome::Dropped(DropReason::UnknownReceiver(receiver.to_string()));
    };
    if !target.is_connected() {
        tracing::debug!(%receiver, ?msg_type, "receiver is disconnecting, dropping");
        return RouteOutcome::Dropped(DropReason::ReceiverUnavailable(receiver.to_string()));
    }

    let msg = match Message::new(msg_type, Some(payload)) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("failed to encode forwarded message: {e}");
            return RouteOutcome::Dropped(DropReason::MalformedPayload);
        }
    };
    match target.send_msg(&msg) {
        Ok(()) => RouteOutcome::Delivered {
            to: receiver.to_string(),
        },
        Err(_) => RouteOutcome::Dropped(DropReason::ReceiverUnavailable(receiver.to_string())),
    }
}
