//! Payload units carried on the peer-to-peer data channel.

use crate::constants::EOF_MARKER;

/// One message on the data channel.
///
/// File bytes always travel as [`ChannelPayload::Binary`]; the end-of-file
/// marker is the only text payload with meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPayload {
    Binary(Vec<u8>),
    Text(String),
}

impl ChannelPayload {
    /// The end-of-file control marker.
    pub fn eof() -> Self {
        Self::Text(EOF_MARKER.to_string())
    }

    /// Returns `true` for the end-of-file marker.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Text(t) if t == EOF_MARKER)
    }

    /// Size in bytes as counted by the channel's send buffer.
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(b) => b.len(),
            Self::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_marker_detection() {
        assert!(ChannelPayload::eof().is_eof());
        assert!(!ChannelPayload::Text("eof".into()).is_eof());
        // Binary bytes spelling "EOF" are file data, not the marker.
        assert!(!ChannelPayload::Binary(b"EOF".to_vec()).is_eof());
    }

    #[test]
    fn payload_len() {
        assert_eq!(ChannelPayload::Binary(vec![0; 7]).len(), 7);
        assert_eq!(ChannelPayload::eof().len(), 3);
        assert!(ChannelPayload::Binary(Vec::new()).is_empty());
    }
}
