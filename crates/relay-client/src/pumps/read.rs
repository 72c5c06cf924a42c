//! WebSocket read pump: turns relay traffic into signal events.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use peerdrop_protocol::constants::{MessageType, WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use peerdrop_protocol::envelope::Message;
use peerdrop_protocol::messages::{AnswerForward, IceCandidateForward, OfferForward, PeersUpdate};

use crate::types::SignalEvent;

/// Reads messages from the relay and forwards them as [`SignalEvent`]s.
///
/// Any incoming frame resets the pong deadline; if nothing arrives within
/// [`WS_PONG_WAIT`] the connection is considered dead. Always finishes by
/// sending [`SignalEvent::Disconnected`].
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: mpsc::UnboundedSender<SignalEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("pong timeout, relay connection dead");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if let Some(event) = parse_signal(&text) {
                                    let _ = events.send(event);
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                            }
                            tungstenite::Message::Pong(_) => trace!("received pong"),
                            tungstenite::Message::Close(_) => {
                                debug!("relay sent close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("relay read error: {e}");
                        break;
                    }
                    None => {
                        debug!("relay stream ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    let _ = events.send(SignalEvent::Disconnected);
}

/// Parses one text frame from the relay.
///
/// Oversized, malformed and unexpected messages are logged and skipped.
pub(crate) fn parse_signal(text: &str) -> Option<SignalEvent> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return None;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse relay message: {e}");
            return None;
        }
    };
    trace!(msg_type = ?msg.msg_type, "received message");

    let parsed = match msg.msg_type {
        MessageType::PeersUpdate => msg
            .parse_payload::<PeersUpdate>()
            .map(|p| p.map(|u| SignalEvent::PeersUpdate(u.peers))),
        MessageType::Offer => msg
            .parse_payload::<OfferForward>()
            .map(|p| p.map(|o| SignalEvent::Offer { from: o.sender, sdp: o.sdp })),
        MessageType::Answer => msg
            .parse_payload::<AnswerForward>()
            .map(|p| p.map(|a| SignalEvent::Answer { from: a.sender, sdp: a.sdp })),
        MessageType::IceCandidate => msg.parse_payload::<IceCandidateForward>().map(|p| {
            p.map(|c| SignalEvent::IceCandidate {
                from: c.sender,
                candidate: c.candidate,
            })
        }),
        MessageType::Welcome => {
            debug!("ignoring repeated welcome");
            return None;
        }
        MessageType::Unknown => {
            debug!("ignoring unknown message type");
            return None;
        }
    };

    match parsed {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            warn!(msg_type = ?msg.msg_type, "message without payload, dropping");
            None
        }
        Err(e) => {
            warn!(msg_type = ?msg.msg_type, "malformed payload: {e}");
            None
        }
    }
}
