use serde_json::Value;

/// Which side of the handshake this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Negotiation state of one session.
///
/// Initiator: `Idle -> Offering -> AwaitingAnswer -> Connected`.
/// Responder: `Idle -> OfferReceived -> Answering -> Connected`.
/// `Failed` is reachable from any non-connected state; `Connected` only
/// moves on to `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Offering,
    AwaitingAnswer,
    OfferReceived,
    Answering,
    Connected,
    Failed(String),
    Disconnected,
}

impl SessionState {
    /// Status line shown to the user.
    pub fn status_text(&self) -> String {
        match self {
            Self::Idle => "Not Connected".into(),
            Self::Offering => "Creating offer...".into(),
            Self::AwaitingAnswer => "Waiting for answer...".into(),
            Self::OfferReceived | Self::Answering => "Received offer, creating answer...".into(),
            Self::Connected => "Connected! Ready to transfer files.".into(),
            Self::Failed(reason) => format!("Error: {reason}"),
            Self::Disconnected => "Disconnected. Reconnect required.".into(),
        }
    }

    /// `true` while a handshake is in flight or a channel is up.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Offering
                | Self::AwaitingAnswer
                | Self::OfferReceived
                | Self::Answering
                | Self::Connected
        )
    }
}

/// Everything one endpoint knows about its current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub local_id: String,
    pub role: Option<Role>,
    pub remote_id: Option<String>,
    pub state: SessionState,
    /// Local candidates gathered before the remote id was known.
    pub pending_candidates: Vec<Value>,
}

impl SessionRecord {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            role: None,
            remote_id: None,
            state: SessionState::Idle,
            pending_candidates: Vec::new(),
        }
    }

    /// Starts a fresh session, dropping anything left from the previous one.
    pub fn begin(&mut self, role: Role, state: SessionState) {
        self.role = Some(role);
        self.remote_id = None;
        self.state = state;
        self.pending_candidates.clear();
    }

    /// Records the remote id and returns the candidates queued for it.
    pub fn set_remote(&mut self, remote_id: &str) -> Vec<Value> {
        self.remote_id = Some(remote_id.to_string());
        std::mem::take(&mut self.pending_candidates)
    }

    /// Returns where to send a local candidate, or queues it if no remote
    /// is known yet.
    pub fn route_local_candidate(&mut self, candidate: Value) -> Option<(String, Value)> {
        match &self.remote_id {
            Some(remote) => Some((remote.clone(), candidate)),
            None => {
                self.pending_candidates.push(candidate);
                None
            }
        }
    }

    /// `true` if `peer_id` is the remote of this session.
    pub fn is_remote(&self, peer_id: &str) -> bool {
        self.remote_id.as_deref() == Some(peer_id)
    }
}
