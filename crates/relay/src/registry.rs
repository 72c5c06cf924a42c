//! Live peer table owned by the relay process.

use std::collections::BTreeMap;
use std::sync::Mutex;

use peerdrop_protocol::constants::MessageType;
use peerdrop_protocol::envelope::Message;
use peerdrop_protocol::messages::PeersUpdate;

use crate::connection::Sender;

/// Tracks which peers are connected and how to reach them.
///
/// Every mutation broadcasts the resulting peer list to all live peers
/// while still holding the lock, so broadcasts are totally ordered with
/// registry updates and no peer ever sees an older list after a newer one.
/// State is in-memory only; a relay restart drops every peer.
pub struct PeerRegistry {
    peers: Mutex<BTreeMap<String, Sender>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Adds a peer and broadcasts the new list.
    ///
    /// Registering an id that is already present replaces its handle.
    /// Returns the peer list that was broadcast.
    pub fn register(&self, peer_id: &str, sender: Sender) -> Vec<String> {
        self.update(|peers| {
            if peers.insert(peer_id.to_string(), sender).is_some() {
                tracing::debug!(peer = %peer_id, "replaced existing registry entry");
            }
        })
    }

    /// Removes a peer and broadcasts the new list.
    ///
    /// No-op (other than the broadcast) if the peer is absent.
    pub fn unregister(&self, peer_id: &str) -> Vec<String> {
        self.update(|peers| {
            peers.remove(peer_id);
        })
    }

    /// Returns the current live peer ids, sorted.
    pub fn list(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Returns the send handle for a live peer.
    pub fn get(&self, peer_id: &str) -> Option<Sender> {
        self.lock().get(peer_id).cloned()
    }

    /// Returns `true` if `peer_id` is live.
    pub fn contains(&self, peer_id: &str) -> bool {
        self.lock().contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn update<F>(&self, mutate: F) -> Vec<String>
    where
        F: FnOnce(&mut BTreeMap<String, Sender>),
    {
        let mut peers = self.lock();
        mutate(&mut peers);

        let snapshot: Vec<String> = peers.keys().cloned().collect();
        let update = PeersUpdate {
            peers: snapshot.clone(),
        };
        match Message::new(MessageType::PeersUpdate, Some(&update)) {
            Ok(msg) => {
                for (id, sender) in peers.iter() {
                    if sender.send_msg(&msg).is_err() {
                        tracing::warn!(peer = %id, "failed to deliver peers-update");
                    }
                }
            }
            Err(e) => tracing::error!("failed to encode peers-update: {e}"),
        }
        snapshot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Sender>> {
        // A panic while holding the lock leaves the map itself intact.
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
