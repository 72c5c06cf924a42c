//! `webrtc` data channels behind the transfer engine's [`DataChannel`] seam.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use peerdrop_protocol::ChannelPayload;
use peerdrop_session::{ChannelHandle, TransportEvent};
use peerdrop_transfer::{ChannelEvent, DataChannel, TransferError};
use tokio::sync::mpsc;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

/// How often the write loop re-reads the SCTP buffer while it drains.
const BUFFER_REFRESH: Duration = Duration::from_millis(10);

/// Counters shared between the channel and its write loop.
#[derive(Default)]
struct Backlog {
    /// Bytes handed to [`DataChannel::send`] but not yet given to SCTP.
    queued: AtomicUsize,
    /// Last buffered amount reported by the SCTP association.
    in_flight: AtomicUsize,
}

/// An open `webrtc` data channel.
///
/// `send` never waits: messages go onto a queue drained by a write task in
/// order, so they reach the remote in the order they were sent.
pub struct RtcChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
    closed: Arc<AtomicBool>,
    backlog: Arc<Backlog>,
    outbound: mpsc::UnboundedSender<ChannelPayload>,
}

impl RtcChannel {
    fn spawn(
        dc: Arc<RTCDataChannel>,
        closed: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(Backlog::default());
        tokio::spawn(write_loop(
            Arc::clone(&dc),
            outbound_rx,
            Arc::clone(&backlog),
            Arc::clone(&closed),
            events,
        ));
        Arc::new(Self {
            label: dc.label().to_string(),
            dc,
            closed,
            backlog,
            outbound,
        })
    }
}

impl DataChannel for RtcChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.dc.ready_state() == RTCDataChannelState::Open
    }

    fn buffered_amount(&self) -> usize {
        self.backlog.queued.load(Ordering::Acquire) + self.backlog.in_flight.load(Ordering::Acquire)
    }

    fn send(&self, payload: ChannelPayload) -> Result<(), TransferError> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed);
        }
        let len = payload.len();
        self.backlog.queued.fetch_add(len, Ordering::AcqRel);
        if self.outbound.send(payload).is_err() {
            self.backlog.queued.fetch_sub(len, Ordering::AcqRel);
            return Err(TransferError::ChannelClosed);
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dc = Arc::clone(&self.dc);
        tokio::spawn(async move {
            if let Err(e) = dc.close().await {
                tracing::debug!(label = %dc.label(), "data channel close failed: {e}");
            }
        });
    }
}

/// Hands queued messages to the channel and tracks its SCTP backlog.
async fn write_loop(
    dc: Arc<RTCDataChannel>,
    mut outbound: mpsc::UnboundedReceiver<ChannelPayload>,
    backlog: Arc<Backlog>,
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        let payload = if backlog.in_flight.load(Ordering::Acquire) > 0 {
            match tokio::time::timeout(BUFFER_REFRESH, outbound.recv()).await {
                Ok(payload) => payload,
                Err(_) => {
                    backlog
                        .in_flight
                        .store(dc.buffered_amount().await, Ordering::Release);
                    continue;
                }
            }
        } else {
            outbound.recv().await
        };
        let Some(payload) = payload else { break };
        if closed.load(Ordering::Acquire) {
            break;
        }

        let len = payload.len();
        let result = match payload {
            ChannelPayload::Binary(data) => dc.send(&Bytes::from(data)).await,
            ChannelPayload::Text(text) => dc.send_text(text).await,
        };
        backlog.queued.fetch_sub(len, Ordering::AcqRel);
        if let Err(e) = result {
            tracing::warn!(label = %dc.label(), "data channel send failed: {e}");
            let _ = events.send(ChannelEvent::Error(e.to_string()));
            break;
        }
        backlog
            .in_flight
            .store(dc.buffered_amount().await, Ordering::Release);
    }
    tracing::debug!(label = %dc.label(), "data channel writer stopped");
}

/// Wires `dc`'s callbacks to a [`ChannelEvent`] stream and reports the
/// channel on `transport` once it opens.
pub(crate) fn attach(dc: Arc<RTCDataChannel>, transport: mpsc::UnboundedSender<TransportEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let channel = RtcChannel::spawn(Arc::clone(&dc), Arc::clone(&closed), events_tx.clone());
    let pending = Mutex::new(Some(ChannelHandle {
        channel,
        events: events_rx,
    }));

    let incoming = events_tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let payload = if msg.is_string {
            ChannelPayload::Text(String::from_utf8_lossy(&msg.data).into_owned())
        } else {
            ChannelPayload::Binary(msg.data.to_vec())
        };
        let _ = incoming.send(ChannelEvent::Message(payload));
        Box::pin(async {})
    }));

    let errors = events_tx.clone();
    dc.on_error(Box::new(move |err| {
        let _ = errors.send(ChannelEvent::Error(err.to_string()));
        Box::pin(async {})
    }));

    let closes = events_tx.clone();
    let label = dc.label().to_string();
    dc.on_close(Box::new(move || {
        tracing::debug!(label = %label, "data channel closed");
        closed.store(true, Ordering::Release);
        let _ = closes.send(ChannelEvent::Closed);
        Box::pin(async {})
    }));

    let announce = move || {
        let handle = pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            tracing::debug!(label = %handle.channel.label(), "data channel open");
            let _ = events_tx.send(ChannelEvent::Open);
            let _ = transport.send(TransportEvent::ChannelOpen(handle));
        }
    };
    if dc.ready_state() == RTCDataChannelState::Open {
        announce();
    } else {
        dc.on_open(Box::new(move || {
            announce();
            Box::pin(async {})
        }));
    }
}
