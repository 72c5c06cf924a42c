//! The data channel seam between the transfer engine and the host transport.

use peerdrop_protocol::ChannelPayload;

use crate::TransferError;

/// An ordered, reliable, message-oriented channel to one remote peer.
///
/// Implemented by the host's peer-connection stack; [`crate::memory`]
/// provides an in-process implementation.
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Returns `true` while messages can be sent.
    fn is_open(&self) -> bool;

    /// Bytes queued locally but not yet handed to the network.
    fn buffered_amount(&self) -> usize;

    /// Queues one message. Never waits.
    fn send(&self, payload: ChannelPayload) -> Result<(), TransferError>;

    /// Closes the channel for both ends.
    fn close(&self);
}

/// Something that happened on a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(ChannelPayload),
    Error(String),
    Closed,
}
