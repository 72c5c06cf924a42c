//! In-process data channel pair.
//!
//! Each end queues outgoing payloads into a forwarding task that delivers
//! them to the other end's event stream, so `buffered_amount` behaves like
//! a real channel's: it grows on `send` and shrinks as payloads are
//! delivered. Delivery can be paused to exercise backpressure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use peerdrop_protocol::ChannelPayload;
use tokio::sync::{mpsc, watch};

use crate::TransferError;
use crate::channel::{ChannelEvent, DataChannel};

enum Frame {
    Data(ChannelPayload),
    Close,
    Fail(String),
}

/// One end of an in-process channel pair.
pub struct MemoryChannel {
    label: String,
    open: Arc<AtomicBool>,
    buffered: Arc<AtomicUsize>,
    sent: AtomicUsize,
    queue: mpsc::UnboundedSender<Frame>,
    paused: watch::Sender<bool>,
}

/// A channel end together with the events it observes.
pub struct MemoryEnd {
    pub channel: Arc<MemoryChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Creates two connected, already-open channel ends.
///
/// Both ends observe [`ChannelEvent::Open`] first. Must be called inside
/// a tokio runtime.
pub fn memory_pair(label: &str) -> (MemoryEnd, MemoryEnd) {
    let open = Arc::new(AtomicBool::new(true));
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let _ = a_tx.send(ChannelEvent::Open);
    let _ = b_tx.send(ChannelEvent::Open);

    let a = MemoryChannel::spawn(label, Arc::clone(&open), b_tx.clone(), a_tx.clone());
    let b = MemoryChannel::spawn(label, open, a_tx, b_tx);

    (
        MemoryEnd {
            channel: a,
            events: a_rx,
        },
        MemoryEnd {
            channel: b,
            events: b_rx,
        },
    )
}

impl MemoryChannel {
    fn spawn(
        label: &str,
        open: Arc<AtomicBool>,
        remote: mpsc::UnboundedSender<ChannelEvent>,
        local: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Arc<Self> {
        let (queue, mut queue_rx) = mpsc::unbounded_channel::<Frame>();
        let (paused, mut paused_rx) = watch::channel(false);
        let buffered = Arc::new(AtomicUsize::new(0));

        let fwd_buffered = Arc::clone(&buffered);
        tokio::spawn(async move {
            while let Some(frame) = queue_rx.recv().await {
                if paused_rx.wait_for(|p| !*p).await.is_err() {
                    break;
                }
                match frame {
                    Frame::Data(payload) => {
                        fwd_buffered.fetch_sub(payload.len(), Ordering::SeqCst);
                        let _ = remote.send(ChannelEvent::Message(payload));
                    }
                    Frame::Close => {
                        let _ = remote.send(ChannelEvent::Closed);
                        let _ = local.send(ChannelEvent::Closed);
                        break;
                    }
                    Frame::Fail(reason) => {
                        let _ = remote.send(ChannelEvent::Error(reason.clone()));
                        let _ = local.send(ChannelEvent::Error(reason));
                        break;
                    }
                }
            }
        });

        Arc::new(Self {
            label: label.to_string(),
            open,
            buffered,
            sent: AtomicUsize::new(0),
            queue,
            paused,
        })
    }

    /// Stops delivering queued payloads until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Number of payloads accepted by `send` so far.
    pub fn sent_messages(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Simulates a transport failure: both ends see [`ChannelEvent::Error`]
    /// after any payloads already queued.
    pub fn fail(&self, reason: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.queue.send(Frame::Fail(reason.to_string()));
        }
    }
}

impl DataChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn send(&self, payload: ChannelPayload) -> Result<(), TransferError> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed);
        }
        let len = payload.len();
        self.buffered.fetch_add(len, Ordering::SeqCst);
        if self.queue.send(Frame::Data(payload)).is_err() {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            return Err(TransferError::ChannelClosed);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.queue.send(Frame::Close);
        }
    }
}
