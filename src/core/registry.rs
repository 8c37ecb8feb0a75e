use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::PeerRecord;

/// Result of [`Registry::deregister`].
#[derive(Debug, Clone, PartialEq)]
pub enum Deregistration {
    /// The peer was removed along with every file entry it advertised.
    Removed(PeerRecord),
    NotFound,
}

#[derive(Default)]
struct RegistryState {
    peers: HashMap<String, PeerRecord>,
    files_index: HashMap<String, HashSet<PeerRecord>>,
}

/// The indexing server's peer/file registry.
///
/// Both maps live behind one lock, so every operation updates them in a
/// single critical section: no other operation can observe a peer in the
/// file index that is missing from the peer table, or the reverse.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `record` and add it under each of `files`.
    ///
    /// Returns how many of `files` were newly indexed for this peer.
    pub async fn register<I, S>(&self, record: PeerRecord, files: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write().await;
        let peer_id = record.peer_id.clone();

        if state.peers.insert(peer_id.clone(), record.clone()).is_some() {
            // Refresh the attributes stored under files registered earlier.
            for peers in state.files_index.values_mut() {
                if peers.contains(&record) {
                    peers.replace(record.clone());
                }
            }
            debug!("Re-registered peer {}", peer_id);
        }

        let mut added = 0;
        for filename in files {
            let filename = filename.into();
            if state
                .files_index
                .entry(filename.clone())
                .or_default()
                .insert(record.clone())
            {
                added += 1;
                debug!("Registered file '{}' for peer {}", filename, peer_id);
            }
        }

        info!(
            "Registered peer {} ({} new files, {} peers total)",
            peer_id,
            added,
            state.peers.len()
        );
        added
    }

    /// Peers currently advertising `filename`, ordered by peer id.
    pub async fn search(&self, filename: &str) -> Vec<PeerRecord> {
        let state = self.state.read().await;
        let mut peers: Vec<PeerRecord> = state
            .files_index
            .get(filename)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        peers
    }

    /// Remove `peer_id` and every file entry pointing at it.
    pub async fn deregister(&self, peer_id: &str) -> Deregistration {
        let mut state = self.state.write().await;

        let Some(record) = state.peers.remove(peer_id) else {
            return Deregistration::NotFound;
        };

        let mut removed = 0;
        state.files_index.retain(|_, peers| {
            if peers.remove(&record) {
                removed += 1;
            }
            !peers.is_empty()
        });

        info!(
            "Deregistered peer {} ({} file entries removed, {} peers left)",
            peer_id,
            removed,
            state.peers.len()
        );
        Deregistration::Removed(record)
    }

    pub async fn peer(&self, peer_id: &str) -> Option<PeerRecord> {
        self.state.read().await.peers.get(peer_id).cloned()
    }

    /// Filenames currently advertised by `peer_id`, sorted.
    pub async fn files_of(&self, peer_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut files: Vec<String> = state
            .files_index
            .iter()
            .filter(|(_, peers)| peers.iter().any(|p| p.peer_id == peer_id))
            .map(|(name, _)| name.clone())
            .collect();
        files.sort();
        files
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peers.len()
    }

    pub async fn file_count(&self) -> usize {
        self.state.read().await.files_index.len()
    }
}
