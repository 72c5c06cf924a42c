//! WebSocket client for peer-to-relay signaling.
//!
//! Connects, waits for the relay's welcome (which carries this peer's id),
//! then runs read / write / ping pumps. Outgoing signals are queued without
//! waiting; incoming traffic arrives on an unbounded [`SignalEvent`] channel.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use peerdrop_protocol::constants::{MessageType, WS_MAX_MESSAGE_SIZE};
use peerdrop_protocol::envelope::Message;
use peerdrop_protocol::messages::{AnswerRequest, IceCandidateRequest, OfferRequest, Welcome};
use peerdrop_session::{OutboundSignal, SessionError, SignalSink};

use crate::ClientError;
use crate::types::SignalEvent;

/// How long to wait for the relay's welcome after the handshake.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound frame queue capacity.
const WRITE_QUEUE_SIZE: usize = 256;

/// A live connection to the signaling relay.
pub struct RelayClient {
    peer_id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl RelayClient {
    /// Connects to the relay at `url` and waits for this peer's id.
    ///
    /// Returns the client and the stream of signaling events addressed to it.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SignalEvent>), ClientError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, mut read) = ws_stream.split();

        let peer_id = tokio::time::timeout(WELCOME_TIMEOUT, wait_for_welcome(&mut read))
            .await
            .map_err(|_| ClientError::Timeout)??;
        tracing::info!(peer = %peer_id, url = %url, "connected to relay");

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE_SIZE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            cancel.clone(),
        ));
        let read_handle = tokio::spawn(crate::pumps::read::read_pump(
            read,
            events_tx,
            write_tx.clone(),
            cancel.clone(),
        ));
        let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx.clone(),
            cancel.clone(),
        ));

        let client = Self {
            peer_id,
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        };
        Ok((client, events_rx))
    }

    /// The id the relay assigned to this peer.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Returns `true` until the connection drops or is closed.
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Queues a signaling message for the relay.
    pub fn send_signal_message(&self, signal: OutboundSignal) -> Result<(), ClientError> {
        match signal {
            OutboundSignal::Offer { receiver, sdp } => self.send(
                MessageType::Offer,
                &OfferRequest {
                    sdp,
                    sender: self.peer_id.clone(),
                    receiver: Some(receiver),
                },
            ),
            OutboundSignal::Answer { receiver, sdp } => self.send(
                MessageType::Answer,
                &AnswerRequest {
                    sdp,
                    receiver: Some(receiver),
                },
            ),
            OutboundSignal::IceCandidate {
                receiver,
                candidate,
            } => self.send(
                MessageType::IceCandidate,
                &IceCandidateRequest {
                    candidate,
                    receiver: Some(receiver),
                },
            ),
        }
    }

    /// Closes the connection. The read pump reports
    /// [`SignalEvent::Disconnected`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn send<T: Serialize>(&self, msg_type: MessageType, payload: &T) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let json = Message::new(msg_type, Some(payload))?.to_json()?;
        self.write_tx
            .try_send(tungstenite::Message::Text(json.into()))
            .map_err(|_| ClientError::Closed)
    }
}

impl SignalSink for RelayClient {
    fn send_signal(&self, signal: OutboundSignal) -> Result<(), SessionError> {
        self.send_signal_message(signal)
            .map_err(|e| SessionError::Signaling(e.to_string()))
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

/// Reads frames until the relay's welcome arrives.
async fn wait_for_welcome<S>(read: &mut S) -> Result<String, ClientError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame? {
            tungstenite::Message::Text(text) => {
                let msg: Message = serde_json::from_str(&text)?;
                if msg.msg_type != MessageType::Welcome {
                    tracing::debug!(msg_type = ?msg.msg_type, "message before welcome, skipping");
                    continue;
                }
                let welcome: Welcome = msg.parse_payload()?.ok_or(ClientError::Closed)?;
                return Ok(welcome.peer_id);
            }
            tungstenite::Message::Close(_) => return Err(ClientError::Closed),
            _ => {}
        }
    }
    Err(ClientError::Closed)
}
