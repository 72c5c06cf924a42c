//! WebRTC transport for peerdrop sessions.
//!
//! [`RtcConnectionFactory`] builds peer connections on the `webrtc` crate
//! and plugs them into the session negotiator. The file channel is created
//! ordered and reliable; its buffered amount counts both messages waiting
//! for the channel and bytes the SCTP association has not sent yet, so the
//! transfer engine's backpressure check sees the whole backlog.

mod channel;
mod connection;
mod convert;

pub use channel::RtcChannel;
pub use connection::{RtcConnectionFactory, RtcOptions};
