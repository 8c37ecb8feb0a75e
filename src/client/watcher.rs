use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::client::PeerAgent;
use crate::utils::Result;

/// Changes seen by one scan of the shared directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectoryChanges {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

impl DirectoryChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Polls a peer's shared directory and turns additions and removals into
/// [`PeerAgent::on_file_created`] / [`PeerAgent::on_file_deleted`] calls.
pub struct DirectoryWatcher {
    agent: Arc<PeerAgent>,
    known: BTreeSet<String>,
    period: Duration,
}

impl DirectoryWatcher {
    /// `known` is the file set already registered with the server.
    pub fn new(agent: Arc<PeerAgent>, known: BTreeSet<String>, period: Duration) -> Self {
        Self {
            agent,
            known,
            period,
        }
    }

    /// Scan once and notify the agent of every change.
    ///
    /// A file whose notification fails stays out of the known set, so the
    /// next scan retries it.
    pub async fn check_once(&mut self) -> Result<DirectoryChanges> {
        let current = self.agent.shared_dir().list_files().await?;
        let mut changes = DirectoryChanges::default();

        for name in current.difference(&self.known) {
            match self.agent.on_file_created(name).await {
                Ok(()) => changes.created.push(name.clone()),
                Err(e) => warn!("Failed to register new file {}: {}", name, e),
            }
        }
        for name in self.known.difference(&current) {
            match self.agent.on_file_deleted(name).await {
                Ok(()) => changes.deleted.push(name.clone()),
                Err(e) => warn!("Failed to deregister removed file {}: {}", name, e),
            }
        }

        for name in &changes.created {
            self.known.insert(name.clone());
        }
        for name in &changes.deleted {
            self.known.remove(name);
        }

        if !changes.is_empty() {
            debug!(
                "Directory scan: {} created, {} deleted",
                changes.created.len(),
                changes.deleted.len()
            );
        }
        Ok(changes)
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial state was
            // registered by the caller.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.check_once().await {
                    warn!("Directory scan failed: {}", e);
                }
            }
        })
    }
}
