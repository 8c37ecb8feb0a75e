use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::client::IndexClient;
use crate::core::protocol::is_valid_token;
use crate::core::{PeerConfig, PeerRecord};
use crate::storage::SharedDir;
use crate::transfer::{FetchOutcome, FileTransferClient, FileTransferServer};
use crate::utils::{IndexError, MetricsCollector, Result};

/// Filenames sent per REGISTER. Registrations are additive, so a large
/// shared directory is advertised over several requests.
pub const REGISTER_BATCH: usize = 1000;

/// Result of fetching a searched file from one peer.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    Downloaded { bytes: u64, path: PathBuf },
    NotAvailable,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PeerDownload {
    pub peer: PeerRecord,
    pub result: DownloadResult,
}

/// A peer's view of the network: it advertises its shared files to the
/// indexing server, serves them to other peers, and fetches files it
/// searches for.
///
/// Each index operation uses a fresh control connection, so a restarted
/// indexing server is picked up transparently.
pub struct PeerAgent {
    config: PeerConfig,
    record: PeerRecord,
    shared: SharedDir,
    downloads: SharedDir,
    metrics: MetricsCollector,
}

impl PeerAgent {
    pub async fn new(config: PeerConfig) -> Result<Self> {
        config.validate()?;
        let record = PeerRecord::new(
            config.peer_id.clone(),
            config.address.clone(),
            config.port,
            config.bandwidth,
        );
        let shared = SharedDir::new(config.shared_dir.clone()).await?;
        let downloads = SharedDir::new(config.download_dir.clone()).await?;

        Ok(Self {
            config,
            record,
            shared,
            downloads,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn record(&self) -> &PeerRecord {
        &self.record
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn shared_dir(&self) -> &SharedDir {
        &self.shared
    }

    /// Counters for this peer's file server and its downloads.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Start this peer's file server on its configured port.
    pub async fn serve(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        FileTransferServer::with_metrics(self.shared.clone(), self.metrics.clone())
            .spawn(&self.config.listen_addr())
            .await
    }

    pub async fn shared_files(&self) -> Result<Vec<String>> {
        Ok(self.shared.list_files().await?.into_iter().collect())
    }

    async fn index(&self) -> Result<IndexClient> {
        IndexClient::connect(&self.config.server_addr).await
    }

    /// Advertise `files`, [`REGISTER_BATCH`] names per REGISTER on one
    /// connection. Also refreshes this peer's address, port and bandwidth on
    /// the server.
    pub async fn register_all(&self, files: &[String]) -> Result<()> {
        let files: Vec<String> = files
            .iter()
            .filter(|name| {
                let ok = is_valid_token(name);
                if !ok {
                    warn!("Skipping unregistrable file name {:?}", name);
                }
                ok
            })
            .cloned()
            .collect();

        let mut client = self.index().await?;
        if files.is_empty() {
            client.register(&self.record, Vec::new()).await?;
        }
        for batch in files.chunks(REGISTER_BATCH) {
            client.register(&self.record, batch.to_vec()).await?;
        }
        info!(
            "Registered {} file(s) as {} with {}",
            files.len(),
            self.record.peer_id,
            self.config.server_addr
        );
        Ok(())
    }

    /// Send a DEREGISTER naming `files`. The server removes this peer
    /// entirely, whatever the list contains.
    ///
    /// Returns `false` if the server did not know this peer.
    pub async fn deregister_all(&self, files: &[String]) -> Result<bool> {
        let files: Vec<String> = files
            .iter()
            .filter(|name| is_valid_token(name))
            .cloned()
            .collect();

        let removed = self
            .index()
            .await?
            .deregister(&self.record.peer_id, files)
            .await?;
        if removed {
            info!("Deregistered {} from {}", self.record.peer_id, self.config.server_addr);
        } else {
            warn!("Server had no registration for {}", self.record.peer_id);
        }
        Ok(removed)
    }

    pub async fn search(&self, filename: &str) -> Result<Vec<PeerRecord>> {
        if !is_valid_token(filename) {
            return Err(IndexError::ConfigError(format!(
                "Cannot search for {:?}: file names must be a single token",
                filename
            )));
        }
        self.index().await?.search(filename).await
    }

    /// Search for `filename` and fetch it from every peer that advertises it,
    /// one peer at a time. A failure with one peer does not stop the others.
    pub async fn search_and_download(&self, filename: &str) -> Result<Vec<PeerDownload>> {
        let destination = self.downloads.resolve(filename).ok_or_else(|| {
            IndexError::ConfigError(format!("Invalid file name {:?}", filename))
        })?;

        let peers = self.search(filename).await?;
        if peers.is_empty() {
            info!("No peers have the file: {}", filename);
            return Ok(Vec::new());
        }
        info!("Found {} peer(s) with {}", peers.len(), filename);

        let mut results = Vec::with_capacity(peers.len());
        for peer in peers {
            if peer == self.record {
                continue;
            }

            info!(
                "Downloading {} from {} at {} (bandwidth {})",
                filename,
                peer.peer_id,
                peer.serving_addr(),
                peer.bandwidth
            );
            let result =
                match FileTransferClient::download(&peer.serving_addr(), filename, &destination)
                    .await
                {
                    Ok(FetchOutcome::Downloaded { bytes }) => {
                        self.metrics.record_bytes_received(bytes).await;
                        DownloadResult::Downloaded {
                            bytes,
                            path: destination.clone(),
                        }
                    }
                    Ok(FetchOutcome::NotAvailable) => DownloadResult::NotAvailable,
                    Err(e) => {
                        warn!("Download from {} failed: {}", peer.peer_id, e);
                        DownloadResult::Failed(e.to_string())
                    }
                };
            results.push(PeerDownload { peer, result });
        }

        Ok(results)
    }

    /// A file appeared in the shared directory: advertise it on its own.
    pub async fn on_file_created(&self, name: &str) -> Result<()> {
        info!("File created: {}", name);
        self.register_all(&[name.to_string()]).await
    }

    /// A file left the shared directory.
    ///
    /// The control protocol only supports peer-wide deregistration, so this
    /// withdraws every file of this peer until the next registration.
    pub async fn on_file_deleted(&self, name: &str) -> Result<()> {
        info!("File deleted: {}", name);
        self.deregister_all(&[name.to_string()]).await?;
        Ok(())
    }
}
