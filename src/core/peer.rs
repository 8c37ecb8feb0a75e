use std::fmt;
use std::hash::{Hash, Hasher};

/// A peer as known to the indexing server.
///
/// Identity is the `peer_id` alone: two records with the same id compare
/// equal and hash identically even when their address or bandwidth differ,
/// so re-registration replaces the old record instead of adding a second one.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: String,
    pub address: String,
    pub port: u16,
    /// Advisory only; never used to rank peers.
    pub bandwidth: f64,
}

impl PeerRecord {
    pub fn new(
        peer_id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        bandwidth: f64,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            address: address.into(),
            port,
            bandwidth,
        }
    }

    /// `host:port` of the peer's file server.
    pub fn serving_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl PartialEq for PeerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.peer_id == other.peer_id
    }
}

impl Eq for PeerRecord {}

impl Hash for PeerRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.peer_id.hash(state);
    }
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:?}` keeps the fractional part, so 100.0 goes out as "100.0".
        write!(
            f,
            "{} {} {} {:?}",
            self.peer_id, self.address, self.port, self.bandwidth
        )
    }
}
