//! Chunked file transfer over a peer-to-peer data channel.
//!
//! The sender reads a file lazily in fixed-size chunks, waits out channel
//! backpressure before every chunk and closes each file with the `"EOF"`
//! text marker. The receiver accumulates binary chunks and finalizes one
//! file per marker. Ordering relies on the channel being reliable and
//! ordered; chunks carry no sequence number or checksum.

mod backpressure;
mod channel;
mod chunked;
pub mod memory;
mod progress;
mod receiver;
mod sender;
mod types;

pub use backpressure::wait_for_capacity;
pub use channel::{ChannelEvent, DataChannel};
pub use chunked::ChunkReader;
pub use progress::{ProgressMeter, SpeedCalculator};
pub use receiver::{Reassembler, receive_files};
pub use sender::{FileSender, ProgressCallback};
pub use types::{Chunk, ProgressUpdate, ReceivedFile, TransferConfig};

/// Default chunk size: 64 KiB.
///
/// Data channel implementations commonly cap a single message around this
/// size, and it matches the default high-water mark.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default buffered-amount threshold above which sending pauses.
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default interval between buffered-amount checks while paused.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data channel closed")]
    ChannelClosed,

    #[error("data channel error: {0}")]
    ChannelFailed(String),

    #[error("send failed: {0}")]
    Send(String),
}
