//! In-process peer connections.
//!
//! Connections created by the same [`MemoryNetwork`] can reach each other.
//! Descriptions are `{"type": .., "sdp": "memory:<connection id>"}`, each
//! local description yields one candidate, and the data channel opens once
//! both sides hold both descriptions and one remote candidate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use peerdrop_transfer::memory::{MemoryChannel, memory_pair};
use peerdrop_transfer::DataChannel;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::SessionError;
use crate::transport::{
    ChannelHandle, ConnectionFactory, IceServer, PeerConnection, TransportEvent, TransportFuture,
};

const SDP_PREFIX: &str = "memory:";
const CANDIDATE_PREFIX: &str = "candidate:memory ";

#[derive(Default)]
struct Entry {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    channel_label: Option<String>,
    local: Option<Value>,
    remote_peer: Option<String>,
    remote_candidates: usize,
    channel: Option<Arc<MemoryChannel>>,
}

impl Entry {
    fn ready(&self) -> bool {
        self.local.is_some() && self.remote_peer.is_some() && self.remote_candidates > 0
    }
}

/// Shared switchboard for in-process peer connections.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    pub fn connections(&self) -> usize {
        self.lock().len()
    }

    /// Fails every open data channel. The connections themselves report
    /// nothing.
    pub fn fail_channels(&self, reason: &str) {
        for entry in self.lock().values() {
            if let Some(channel) = &entry.channel {
                channel.fail(reason);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens the data channel between `id` and its remote once both are ready.
    fn try_connect(&self, id: &str) {
        let mut entries = self.lock();
        let Some(remote_id) = entries.get(id).and_then(|e| e.remote_peer.clone()) else {
            return;
        };
        let (Some(local), Some(remote)) = (entries.get(id), entries.get(&remote_id)) else {
            return;
        };
        if !local.ready() || !remote.ready() || local.channel.is_some() {
            return;
        }
        let Some(label) = local.channel_label.clone().or_else(|| remote.channel_label.clone())
        else {
            tracing::debug!(connection = %id, "no data channel negotiated");
            return;
        };

        let (a, b) = memory_pair(&label);
        for (conn_id, end) in [(id.to_string(), a), (remote_id.clone(), b)] {
            if let Some(entry) = entries.get_mut(&conn_id) {
                entry.channel = Some(Arc::clone(&end.channel));
                if let Some(events) = &entry.events {
                    let _ = events.send(TransportEvent::ChannelOpen(ChannelHandle {
                        channel: end.channel,
                        events: end.events,
                    }));
                }
            }
        }
    }
}

impl ConnectionFactory for MemoryNetwork {
    fn create<'a>(
        &'a self,
        ice_servers: &'a [IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportFuture<'a, Box<dyn PeerConnection>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::debug!(connection = %id, servers = ice_servers.len(), "memory connection created");
            self.lock().insert(
                id.clone(),
                Entry {
                    events: Some(events),
                    ..Entry::default()
                },
            );
            let conn: Box<dyn PeerConnection> = Box::new(MemoryPeerConnection {
                id,
                network: self.clone(),
            });
            Ok(conn)
        })
    }
}

struct MemoryPeerConnection {
    id: String,
    network: MemoryNetwork,
}

impl MemoryPeerConnection {
    fn description(&self, kind: &str) -> Value {
        json!({"type": kind, "sdp": format!("{SDP_PREFIX}{}", self.id)})
    }

    fn with_entry<T>(&self, f: impl FnOnce(&mut Entry) -> T) -> Result<T, SessionError> {
        let mut entries = self.network.lock();
        let entry = entries
            .get_mut(&self.id)
            .ok_or_else(|| SessionError::Transport("connection closed".into()))?;
        Ok(f(entry))
    }
}

fn peer_of(description: &Value) -> Result<String, SessionError> {
    description
        .get("sdp")
        .and_then(Value::as_str)
        .and_then(|s| s.strip_prefix(SDP_PREFIX))
        .map(str::to_string)
        .ok_or_else(|| SessionError::Transport("unrecognized session description".into()))
}

impl PeerConnection for MemoryPeerConnection {
    fn create_data_channel(&self, label: &str) -> TransportFuture<'_, ()> {
        let label = label.to_string();
        Box::pin(async move { self.with_entry(|e| e.channel_label = Some(label)) })
    }

    fn create_offer(&self) -> TransportFuture<'_, Value> {
        Box::pin(async move { Ok(self.description("offer")) })
    }

    fn create_answer(&self) -> TransportFuture<'_, Value> {
        Box::pin(async move {
            let has_remote = self.with_entry(|e| e.remote_peer.is_some())?;
            if !has_remote {
                return Err(SessionError::Transport(
                    "cannot answer without a remote offer".into(),
                ));
            }
            Ok(self.description("answer"))
        })
    }

    fn set_local_description(&self, description: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let events = self.with_entry(|e| {
                e.local = Some(description);
                e.events.clone()
            })?;
            // Gathering yields exactly one host candidate.
            if let Some(events) = events {
                let _ = events.send(TransportEvent::LocalCandidate(json!({
                    "candidate": format!("{CANDIDATE_PREFIX}{}", self.id),
                    "sdpMid": "0",
                    "sdpMLineIndex": 0,
                })));
            }
            self.network.try_connect(&self.id);
            Ok(())
        })
    }

    fn set_remote_description(&self, description: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let peer = peer_of(&description)?;
            self.with_entry(|e| e.remote_peer = Some(peer))?;
            self.network.try_connect(&self.id);
            Ok(())
        })
    }

    fn add_ice_candidate(&self, candidate: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let valid = candidate
                .get("candidate")
                .and_then(Value::as_str)
                .is_some_and(|c| c.starts_with(CANDIDATE_PREFIX));
            if !valid {
                return Err(SessionError::Transport("unrecognized ICE candidate".into()));
            }
            self.with_entry(|e| e.remote_candidates += 1)?;
            self.network.try_connect(&self.id);
            Ok(())
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(entry) = self.network.lock().remove(&self.id) {
                if let Some(channel) = entry.channel {
                    channel.close();
                }
            }
            Ok(())
        })
    }
}
