use std::fmt;

use serde::{Deserialize, Serialize};

/// A node in the network, identified by its private host:port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub host: String,
}

impl Peer {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn matches(&self, host: &str) -> bool {
        self.host == host
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// Snapshot of a peer's chain tip and its view of the network.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeerStatus {
    pub latest_block_hash: String,
    pub latest_block_number: u64,
    pub known_peers: Vec<Peer>,
}
