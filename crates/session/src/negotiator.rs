use std::sync::Arc;

use peerdrop_protocol::constants::FILE_CHANNEL_LABEL;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::state::{Role, SessionRecord, SessionState};
use crate::transport::{
    ChannelHandle, ConnectionFactory, IceServer, OutboundSignal, PeerConnection, SignalSink,
    TransportEvent,
};
use crate::{DEFAULT_STUN_URL, SessionError};

/// Status text shown between applying the answer and the channel opening.
const ANSWER_RECEIVED_TEXT: &str = "Answer received, finalizing connection...";

/// Reason recorded when connectivity drops before the channel opened.
const CONNECTION_LOST: &str = "Connection lost.";

/// Negotiation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatorConfig {
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,
    #[serde(default = "default_channel_label")]
    pub channel_label: String,
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun(DEFAULT_STUN_URL)]
}

fn default_channel_label() -> String {
    FILE_CHANNEL_LABEL.to_string()
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            channel_label: default_channel_label(),
        }
    }
}

/// Reported to the endpoint owning the negotiator.
#[derive(Debug)]
pub enum SessionEvent {
    /// The session moved (or its status line changed).
    Status { state: SessionState, text: String },
    /// A data channel to `remote_id` is open and ready for transfers.
    ChannelReady {
        remote_id: String,
        channel: ChannelHandle,
    },
}

/// Drives the offer/answer/candidate handshake for one endpoint.
///
/// Holds at most one session at a time. All methods run on the endpoint's
/// task; transport callbacks are pulled with
/// [`next_transport_event`](Self::next_transport_event) and applied with
/// [`handle_transport_event`](Self::handle_transport_event).
pub struct Negotiator {
    config: NegotiatorConfig,
    factory: Arc<dyn ConnectionFactory>,
    signals: Arc<dyn SignalSink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    record: SessionRecord,
    connection: Option<Box<dyn PeerConnection>>,
    transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Negotiator {
    pub fn new(
        local_id: impl Into<String>,
        config: NegotiatorConfig,
        factory: Arc<dyn ConnectionFactory>,
        signals: Arc<dyn SignalSink>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            factory,
            signals,
            events,
            record: SessionRecord::new(local_id),
            connection: None,
            transport_rx: None,
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn state(&self) -> &SessionState {
        &self.record.state
    }

    pub fn local_id(&self) -> &str {
        &self.record.local_id
    }

    /// Starts a session to `remote_id` as the initiator.
    ///
    /// Any previous session is closed first.
    pub async fn create_connection(&mut self, remote_id: &str) -> Result<(), SessionError> {
        self.reset().await;
        self.record.begin(Role::Initiator, SessionState::Offering);
        self.emit_status(None);
        tracing::info!(remote = %remote_id, "creating offer");

        let result = self.start_offer(remote_id).await;
        self.fail_on_error(result)
    }

    async fn start_offer(&mut self, remote_id: &str) -> Result<(), SessionError> {
        let (conn, transport_rx) = self.new_connection().await?;
        self.connection = Some(conn);
        self.transport_rx = Some(transport_rx);
        let conn = self.connection.as_ref().ok_or(SessionError::NoConnection)?;
        conn.create_data_channel(&self.config.channel_label).await?;
        let offer = conn.create_offer().await?;
        conn.set_local_description(offer.clone()).await?;

        self.signals.send_signal(OutboundSignal::Offer {
            receiver: remote_id.to_string(),
            sdp: offer,
        })?;
        self.set_state(SessionState::AwaitingAnswer);
        self.learn_remote(remote_id)
    }

    /// Answers an offer from `from`.
    ///
    /// Ignored while a session with a different remote is in progress. An
    /// offer the transport rejects is logged and leaves the current session
    /// untouched.
    pub async fn handle_offer(&mut self, from: &str, sdp: Value) -> Result<(), SessionError> {
        if self.record.state.is_busy() && !self.record.is_remote(from) {
            tracing::warn!(
                from = %from,
                current = ?self.record.remote_id,
                "ignoring offer while another session is active"
            );
            return Ok(());
        }
        if let Err(e) = check_description(&sdp, "offer") {
            tracing::warn!(from = %from, "ignoring offer: {e}");
            return Ok(());
        }

        // The offer is applied to a fresh connection before the current one
        // is torn down, so a rejected offer costs nothing.
        let (conn, transport_rx) = match self.new_connection().await {
            Ok(created) => created,
            Err(e) => {
                self.reset().await;
                self.record.begin(Role::Responder, SessionState::OfferReceived);
                return self.fail_on_error(Err(e));
            }
        };
        if let Err(e) = conn.set_remote_description(sdp).await {
            tracing::warn!(from = %from, "ignoring offer the transport rejected: {e}");
            if let Err(e) = conn.close().await {
                tracing::debug!("error closing rejected connection: {e}");
            }
            return Ok(());
        }

        self.reset().await;
        self.connection = Some(conn);
        self.transport_rx = Some(transport_rx);
        self.record.begin(Role::Responder, SessionState::OfferReceived);
        self.emit_status(None);
        tracing::info!(from = %from, "received offer");

        let result = self.answer_offer(from).await;
        self.fail_on_error(result)
    }

    async fn answer_offer(&mut self, from: &str) -> Result<(), SessionError> {
        self.set_state(SessionState::Answering);
        let conn = self.connection.as_ref().ok_or(SessionError::NoConnection)?;
        let answer = conn.create_answer().await?;
        conn.set_local_description(answer.clone()).await?;

        self.signals.send_signal(OutboundSignal::Answer {
            receiver: from.to_string(),
            sdp: answer,
        })?;
        self.learn_remote(from)
    }

    /// Applies the answer to our offer.
    ///
    /// Answers that do not match the pending offer, or that the transport
    /// rejects, are logged and ignored.
    pub async fn handle_answer(&mut self, from: &str, sdp: Value) -> Result<(), SessionError> {
        if self.record.role != Some(Role::Initiator)
            || self.record.state != SessionState::AwaitingAnswer
            || !self.record.is_remote(from)
        {
            tracing::warn!(from = %from, state = ?self.record.state, "ignoring unexpected answer");
            return Ok(());
        }
        if let Err(e) = check_description(&sdp, "answer") {
            tracing::warn!(from = %from, "ignoring answer: {e}");
            return Ok(());
        }
        let Some(conn) = self.connection.as_ref() else {
            return Err(SessionError::NoConnection);
        };

        if let Err(e) = conn.set_remote_description(sdp).await {
            tracing::warn!(from = %from, "ignoring answer the transport rejected: {e}");
            return Ok(());
        }
        self.emit_status(Some(ANSWER_RECEIVED_TEXT));
        tracing::info!(from = %from, "answer applied");
        Ok(())
    }

    /// Adds a candidate from the remote peer.
    ///
    /// Candidates arriving before a connection exists, or from anyone but
    /// the current remote, are dropped.
    pub async fn handle_remote_candidate(
        &mut self,
        from: &str,
        candidate: Value,
    ) -> Result<(), SessionError> {
        let Some(conn) = self.connection.as_ref() else {
            tracing::warn!(from = %from, "ICE candidate before connection exists, dropping");
            return Ok(());
        };
        if !self.record.is_remote(from) {
            tracing::warn!(from = %from, "ICE candidate from unknown peer, dropping");
            return Ok(());
        }
        if let Err(e) = conn.add_ice_candidate(candidate).await {
            tracing::warn!(from = %from, "failed to add ICE candidate: {e}");
        }
        Ok(())
    }

    /// Waits for the next event from the current connection.
    ///
    /// Pending forever while there is no connection.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        loop {
            let Some(rx) = self.transport_rx.as_mut() else {
                return std::future::pending().await;
            };
            match rx.recv().await {
                Some(event) => return event,
                None => self.transport_rx = None,
            }
        }
    }

    /// Applies one transport event to the session.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), SessionError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if let Some((receiver, candidate)) = self.record.route_local_candidate(candidate) {
                    self.signals.send_signal(OutboundSignal::IceCandidate {
                        receiver,
                        candidate,
                    })?;
                } else {
                    tracing::debug!("queued local candidate until remote is known");
                }
            }
            TransportEvent::ChannelOpen(channel) => {
                let Some(remote_id) = self.record.remote_id.clone() else {
                    tracing::warn!("data channel opened without a session, closing");
                    channel.channel.close();
                    return Ok(());
                };
                self.set_state(SessionState::Connected);
                tracing::info!(remote = %remote_id, label = %channel.channel.label(), "data channel open");
                let _ = self.events.send(SessionEvent::ChannelReady { remote_id, channel });
            }
            TransportEvent::ConnectivityLost => {
                if self.record.state == SessionState::Connected {
                    tracing::warn!(remote = ?self.record.remote_id, "connectivity lost");
                    self.set_state(SessionState::Disconnected);
                } else if self.record.state.is_busy() {
                    self.set_state(SessionState::Failed(CONNECTION_LOST.into()));
                }
            }
            TransportEvent::Failed(reason) => {
                tracing::error!(remote = ?self.record.remote_id, "connection failed: {reason}");
                self.set_state(SessionState::Failed(reason));
            }
        }
        Ok(())
    }

    /// Closes the current connection and returns to idle.
    pub async fn close(&mut self) {
        self.reset().await;
        self.record = SessionRecord::new(self.record.local_id.clone());
        self.emit_status(None);
    }

    async fn new_connection(
        &self,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::UnboundedReceiver<TransportEvent>), SessionError>
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = self.factory.create(&self.config.ice_servers, tx).await?;
        Ok((conn, rx))
    }

    /// Records the remote and relays candidates gathered before it was known.
    fn learn_remote(&mut self, remote_id: &str) -> Result<(), SessionError> {
        for candidate in self.record.set_remote(remote_id) {
            self.signals.send_signal(OutboundSignal::IceCandidate {
                receiver: remote_id.to_string(),
                candidate,
            })?;
        }
        Ok(())
    }

    async fn reset(&mut self) {
        self.transport_rx = None;
        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!("error closing previous connection: {e}");
            }
        }
    }

    fn fail_on_error(&mut self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        if let Err(e) = &result {
            tracing::error!(remote = ?self.record.remote_id, "negotiation failed: {e}");
            self.set_state(SessionState::Failed(e.to_string()));
        }
        result
    }

    fn set_state(&mut self, state: SessionState) {
        if self.record.state == state {
            return;
        }
        self.record.state = state;
        self.emit_status(None);
    }

    fn emit_status(&self, text: Option<&str>) {
        let state = self.record.state.clone();
        let text = text.map_or_else(|| state.status_text(), str::to_string);
        let _ = self.events.send(SessionEvent::Status { state, text });
    }
}

/// Checks that `description` is a session description of the given kind.
fn check_description(description: &Value, kind: &str) -> Result<(), SessionError> {
    let actual = description.get("type").and_then(Value::as_str);
    let has_sdp = description.get("sdp").is_some_and(Value::is_string);
    if actual == Some(kind) && has_sdp {
        Ok(())
    } else {
        Err(SessionError::InvalidDescription(format!(
            "expected an {kind} with an sdp string"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use std::time::Duration;

    struct Peer {
        negotiator: Negotiator,
        signals: mpsc::UnboundedReceiver<OutboundSignal>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    fn peer(id: &str, network: &MemoryNetwork) -> Peer {
        let (sig_tx, signals) = mpsc::unbounded_channel();
        let (ev_tx, events) = mpsc::unbounded_channel();
        let negotiator = Negotiator::new(
            id,
            NegotiatorConfig::default(),
            Arc::new(network.clone()),
            Arc::new(sig_tx),
            ev_tx,
        );
        Peer {
            negotiator,
            signals,
            events,
        }
    }

    async fn deliver(to: &mut Negotiator, from: &str, signal: OutboundSignal) {
        match signal {
            OutboundSignal::Offer { sdp, .. } => to.handle_offer(from, sdp).await.unwrap(),
            OutboundSignal::Answer { sdp, .. } => to.handle_answer(from, sdp).await.unwrap(),
            OutboundSignal::IceCandidate { candidate, .. } => {
                to.handle_remote_candidate(from, candidate).await.unwrap()
            }
        }
    }

    /// Shuttles signals and transport events until both sides connect.
    async fn run_until_connected(a: &mut Peer, b: &mut Peer) {
        let a_id = a.negotiator.local_id().to_string();
        let b_id = b.negotiator.local_id().to_string();
        let deadline = tokio::time::sleep(Duration::from_secs(2));
        tokio::pin!(deadline);
        while a.negotiator.state() != &SessionState::Connected
            || b.negotiator.state() != &SessionState::Connected
        {
            tokio::select! {
                () = &mut deadline => panic!("handshake did not complete"),
                Some(sig) = a.signals.recv() => {
                    assert_eq!(sig.receiver(), b_id);
                    deliver(&mut b.negotiator, &a_id, sig).await;
                }
                Some(sig) = b.signals.recv() => {
                    assert_eq!(sig.receiver(), a_id);
                    deliver(&mut a.negotiator, &b_id, sig).await;
                }
                ev = a.negotiator.next_transport_event() => {
                    a.negotiator.handle_transport_event(ev).await.unwrap();
                }
                ev = b.negotiator.next_transport_event() => {
                    b.negotiator.handle_transport_event(ev).await.unwrap();
                }
            }
        }
    }

    fn statuses(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<String> {
        let mut out = vec![];
        while let Ok(ev) = events.try_recv() {
            if let SessionEvent::Status { text, .. } = ev {
                out.push(text);
            }
        }
        out
    }

    #[tokio::test]
    async fn initiator_and_responder_connect() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        let mut b = peer("B2", &network);

        a.negotiator.create_connection("B2").await.unwrap();
        assert_eq!(a.negotiator.state(), &SessionState::AwaitingAnswer);

        run_until_connected(&mut a, &mut b).await;

        assert_eq!(a.negotiator.record().role, Some(Role::Initiator));
        assert_eq!(b.negotiator.record().role, Some(Role::Responder));
        assert_eq!(b.negotiator.record().remote_id.as_deref(), Some("A1"));

        let a_status = statuses(&mut a.events);
        assert_eq!(
            a_status,
            vec![
                "Creating offer...",
                "Waiting for answer...",
                "Answer received, finalizing connection...",
                "Connected! Ready to transfer files.",
            ]
        );
        let b_status = statuses(&mut b.events);
        assert_eq!(b_status.first().unwrap(), "Received offer, creating answer...");
        assert_eq!(b_status.last().unwrap(), "Connected! Ready to transfer files.");
    }

    #[tokio::test]
    async fn both_sides_receive_channel() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        let mut b = peer("B2", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        run_until_connected(&mut a, &mut b).await;

        let mut ready = 0;
        for events in [&mut a.events, &mut b.events] {
            while let Ok(ev) = events.try_recv() {
                if let SessionEvent::ChannelReady { channel, .. } = ev {
                    assert_eq!(channel.channel.label(), "fileChannel");
                    assert!(channel.channel.is_open());
                    ready += 1;
                }
            }
        }
        assert_eq!(ready, 2);
    }

    #[tokio::test]
    async fn candidate_before_connection_is_dropped() {
        let network = MemoryNetwork::new();
        let mut b = peer("B2", &network);
        b.negotiator
            .handle_remote_candidate("A1", serde_json::json!({"candidate": "c"}))
            .await
            .unwrap();
        assert_eq!(b.negotiator.state(), &SessionState::Idle);
    }

    #[tokio::test]
    async fn answer_without_offer_is_ignored() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator
            .handle_answer("B2", serde_json::json!({"type": "answer"}))
            .await
            .unwrap();
        assert_eq!(a.negotiator.state(), &SessionState::Idle);
    }

    #[tokio::test]
    async fn offer_from_third_peer_ignored_while_busy() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator.create_connection("B2").await.unwrap();

        a.negotiator
            .handle_offer("C3", serde_json::json!({"type": "offer", "sdp": "memory:x"}))
            .await
            .unwrap();
        assert_eq!(a.negotiator.state(), &SessionState::AwaitingAnswer);
        assert!(a.negotiator.record().is_remote("B2"));
    }

    #[tokio::test]
    async fn malformed_offer_keeps_connected_session() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        let mut b = peer("B2", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        run_until_connected(&mut a, &mut b).await;
        statuses(&mut b.events);
        let live = network.connections();

        for bad in [
            serde_json::json!("garbage"),
            serde_json::json!({"type": "answer", "sdp": "memory:x"}),
            serde_json::json!({"type": "offer", "sdp": "v=0"}),
        ] {
            b.negotiator.handle_offer("A1", bad).await.unwrap();
            assert_eq!(b.negotiator.state(), &SessionState::Connected);
            assert!(b.negotiator.record().is_remote("A1"));
        }
        assert!(statuses(&mut b.events).is_empty());
        assert_eq!(network.connections(), live);
    }

    #[tokio::test]
    async fn malformed_offer_while_idle_is_ignored() {
        let network = MemoryNetwork::new();
        let mut b = peer("B2", &network);
        b.negotiator
            .handle_offer("A1", serde_json::json!({"type": "offer", "sdp": "v=0"}))
            .await
            .unwrap();
        assert_eq!(b.negotiator.state(), &SessionState::Idle);
        assert_eq!(b.negotiator.record().role, None);
        assert!(statuses(&mut b.events).is_empty());
        assert_eq!(network.connections(), 0);
    }

    #[tokio::test]
    async fn rejected_answer_keeps_waiting() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        statuses(&mut a.events);

        for bad in [
            serde_json::json!({"type": "answer", "sdp": "v=0"}),
            serde_json::json!({"type": "offer", "sdp": "memory:x"}),
            serde_json::json!(42),
        ] {
            a.negotiator.handle_answer("B2", bad).await.unwrap();
            assert_eq!(a.negotiator.state(), &SessionState::AwaitingAnswer);
        }
        assert!(statuses(&mut a.events).is_empty());
    }

    #[test]
    fn description_shape_check() {
        let offer = serde_json::json!({"type": "offer", "sdp": "v=0"});
        assert!(check_description(&offer, "offer").is_ok());
        assert!(check_description(&offer, "answer").is_err());
        assert!(check_description(&serde_json::json!({"type": "offer"}), "offer").is_err());
        assert!(check_description(&serde_json::json!(null), "offer").is_err());
    }

    #[tokio::test]
    async fn connectivity_loss_after_connect_disconnects() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        let mut b = peer("B2", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        run_until_connected(&mut a, &mut b).await;

        a.negotiator
            .handle_transport_event(TransportEvent::ConnectivityLost)
            .await
            .unwrap();
        assert_eq!(a.negotiator.state(), &SessionState::Disconnected);
        assert_eq!(
            statuses(&mut a.events).pop().unwrap(),
            "Disconnected. Reconnect required."
        );
    }

    #[tokio::test]
    async fn connectivity_loss_while_negotiating_fails() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        a.negotiator
            .handle_transport_event(TransportEvent::ConnectivityLost)
            .await
            .unwrap();
        assert_eq!(
            a.negotiator.state(),
            &SessionState::Failed("Connection lost.".into())
        );
        assert_eq!(statuses(&mut a.events).pop().unwrap(), "Error: Connection lost.");
    }

    #[tokio::test]
    async fn local_candidates_relayed_to_remote() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator.create_connection("B2").await.unwrap();

        // Offer first, then the candidate gathered by set_local_description.
        let offer = a.signals.recv().await.unwrap();
        assert!(matches!(offer, OutboundSignal::Offer { .. }));

        let ev = a.negotiator.next_transport_event().await;
        a.negotiator.handle_transport_event(ev).await.unwrap();
        match a.signals.recv().await.unwrap() {
            OutboundSignal::IceCandidate { receiver, .. } => assert_eq!(receiver, "B2"),
            other => panic!("expected candidate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_returns_to_idle() {
        let network = MemoryNetwork::new();
        let mut a = peer("A1", &network);
        a.negotiator.create_connection("B2").await.unwrap();
        a.negotiator.close().await;
        assert_eq!(a.negotiator.state(), &SessionState::Idle);
        assert_eq!(a.negotiator.record().remote_id, None);
        assert_eq!(statuses(&mut a.events).pop().unwrap(), "Not Connected");
    }
}
