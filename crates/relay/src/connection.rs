//! Peer connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use peerdrop_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT};
use peerdrop_protocol::envelope::Message;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::registry::PeerRegistry;
use crate::router;

/// Handle for sending messages to one connected peer.
///
/// Cloneable and cheap: wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Creates a sender and the receiving end drained by the write pump.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Never waits: a full buffer or closed connection drops the message.
    pub fn send_msg(&self, msg: &Message) -> Result<(), SendError> {
        let json = serde_json::to_string(msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Active connection to a peer.
///
/// Owns the read/write pump tasks and provides a [`Sender`] for
/// asynchronous message delivery.
pub struct RelayConnection {
    pub peer_id: String,
    sender: Sender,
    cancel: CancellationToken,
}

impl RelayConnection {
    /// Returns a cloneable [`Sender`] for this connection.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Signals both pumps to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Registers a new peer and runs the read and write pumps for its socket.
///
/// `welcome` is queued ahead of everything else so the peer learns its own
/// id before the first presence broadcast. The peer is registered before
/// either pump starts; when the read pump exits it is unregistered and the
/// new presence list is broadcast.
pub fn spawn_connection<S>(
    ws_stream: S,
    peer_id: String,
    welcome: &Message,
    registry: Arc<PeerRegistry>,
    server_cancel: CancellationToken,
) -> Result<RelayConnection, SendError>
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
{
    let (sender, rx) = Sender::channel(SEND_BUFFER_SIZE);
    sender.send_msg(welcome)?;
    let live = registry.register(&peer_id, sender.clone());
    tracing::debug!(peer = %peer_id, live = live.len(), "peer registered");

    let cancel = server_cancel.child_token();
    let conn = RelayConnection {
        peer_id: peer_id.clone(),
        sender: sender.clone(),
        cancel: cancel.clone(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    let read_cancel = cancel;
    let read_sender = sender;
    tokio::spawn(async move {
        read_pump(ws_stream, &peer_id, read_sender, &registry, read_cancel.clone()).await;
        // When read pump exits, cancel the write pump too.
        read_cancel.cancel();
        let remaining = registry.unregister(&peer_id);
        tracing::info!(peer = %peer_id, live = remaining.len(), "peer disconnected");
    });

    Ok(conn)
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and hands signaling messages to the router.
async fn read_pump<S>(
    mut stream: S,
    peer_id: &str,
    sender: Sender,
    registry: &PeerRegistry,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
{
    // Any incoming frame resets the deadline; silence for WS_PONG_WAIT
    // means the peer is gone.
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                tracing::warn!(peer = %peer_id, "pong timeout, closing connection");
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!(peer = %peer_id, "message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_text(registry, peer_id, &text);
                            }
                            WsMessage::Binary(data) => {
                                tracing::warn!(peer = %peer_id, len = data.len(), "binary frame on signaling connection, ignoring");
                            }
                            WsMessage::Ping(data) => {
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Pong(_) => {}
                            WsMessage::Close(_) => {
                                tracing::debug!(peer = %peer_id, "received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(peer = %peer_id, "read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                }
            }
        }
    }
}

/// Parses one text frame and routes it.
fn dispatch_text(registry: &PeerRegistry, peer_id: &str, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(peer = %peer_id, "invalid message JSON: {e}");
            return;
        }
    };
    let outcome = router::route(registry, peer_id, &msg);
    tracing::trace!(peer = %peer_id, ?outcome, "routed message");
}
