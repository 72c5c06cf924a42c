pub mod constants;
pub mod envelope;
pub mod messages;
pub mod payload;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::Message;
pub use messages::{
    AnswerForward, AnswerRequest, IceCandidateForward, IceCandidateRequest, OfferForward,
    OfferRequest, PeersUpdate, Welcome,
};
pub use payload::ChannelPayload;

/// Opaque peer identifier assigned by the relay.
pub type PeerId = String;
