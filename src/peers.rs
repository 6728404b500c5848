use std::collections::HashSet;

use parking_lot::RwLock;

use crate::types::Peer;

/// Thread-safe set of known peers, keyed by host.
pub struct PeerSet {
    set: RwLock<HashSet<Peer>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self {
            set: RwLock::new(HashSet::new()),
        }
    }

    /// Adds a peer and reports whether it was newly inserted.
    pub fn add(&self, peer: Peer) -> bool {
        self.set.write().insert(peer)
    }

    pub fn remove(&self, peer: &Peer) {
        self.set.write().remove(peer);
    }

    /// All peers except those matching `exclude_host`. An empty exclude
    /// returns the full set, self included, which leader election relies on.
    pub fn copy(&self, exclude_host: &str) -> Vec<Peer> {
        self.set
            .read()
            .iter()
            .filter(|peer| !peer.matches(exclude_host))
            .cloned()
            .collect()
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}
