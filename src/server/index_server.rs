use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::core::protocol::{DecodeError, REASON_PEER_NOT_FOUND, Request, Response};
use crate::core::{Deregistration, Registry, ServerConfig};
use crate::network::transport::MAX_REQUEST_LEN;
use crate::network::{ConnectionAcceptor, ConnectionHandler, LineRead, Transport};
use crate::utils::metrics::RequestKind;
use crate::utils::{MetricsCollector, Result};

/// Central index: answers REGISTER / SEARCH / DEREGISTER on control
/// connections. Each connection is served by its own task and may carry any
/// number of sequential requests.
#[derive(Clone, Default)]
pub struct IndexingServer {
    registry: Registry,
    metrics: MetricsCollector,
}

impl IndexingServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Bind the listener and serve in the background.
    pub async fn spawn(self, config: &ServerConfig) -> Result<(SocketAddr, JoinHandle<()>)> {
        let acceptor =
            ConnectionAcceptor::bind("indexing-server", &config.listen_addr(), self.metrics.clone())
                .await?;
        let addr = acceptor.local_addr()?;
        Ok((addr, acceptor.spawn(Arc::new(self))))
    }

    /// Serve until Ctrl+C.
    pub async fn run(self, config: &ServerConfig) -> Result<()> {
        let metrics = self.metrics.clone();
        let (addr, handle) = self.spawn(config).await?;
        info!("Indexing server started on {}", addr);

        tokio::signal::ctrl_c().await?;
        info!("Ctrl+C received, shutting down");
        handle.abort();
        metrics.print_stats().await;
        Ok(())
    }

    /// Decode one request line and apply it to the registry.
    pub async fn handle_request(&self, line: &str) -> Response {
        let request = match Request::decode(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected request {:?}: {:?}", line, e);
                self.metrics.record_request(RequestKind::Rejected).await;
                return e.into_response();
            }
        };

        match request {
            Request::Register { record, files } => {
                self.metrics.record_request(RequestKind::Register).await;
                self.registry.register(record, files).await;
                Response::RegisterSuccess
            }
            Request::Search { filename } => {
                self.metrics.record_request(RequestKind::Search).await;
                let peers = self.registry.search(&filename).await;
                debug!("Search '{}': {} peer(s)", filename, peers.len());
                Response::SearchResults(peers)
            }
            Request::Deregister { peer_id, files } => {
                self.metrics.record_request(RequestKind::Deregister).await;
                if !files.is_empty() {
                    debug!(
                        "DEREGISTER for {} named {} file(s); removing the whole peer",
                        peer_id,
                        files.len()
                    );
                }
                match self.registry.deregister(&peer_id).await {
                    Deregistration::Removed(_) => Response::DeregisterSuccess,
                    Deregistration::NotFound => {
                        Response::DeregisterFailure(REASON_PEER_NOT_FOUND.to_string())
                    }
                }
            }
        }
    }
}

impl ConnectionHandler for IndexingServer {
    async fn handle(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        info!("Accepted control connection from {}", addr);
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            let response = match Transport::read_line_bounded(&mut reader, MAX_REQUEST_LEN).await? {
                LineRead::Line(line) => {
                    debug!("Received request from {}: {}", addr, line);
                    self.handle_request(&line).await
                }
                LineRead::Oversized(prefix) => {
                    warn!("Request from {} exceeds {} bytes", addr, MAX_REQUEST_LEN);
                    self.metrics.record_request(RequestKind::Rejected).await;
                    DecodeError::oversized(&prefix).into_response()
                }
                LineRead::Closed => break,
            };
            Transport::send_data(&mut writer, response.encode().as_bytes()).await?;
        }

        info!("Closed control connection with {}", addr);
        Ok(())
    }
}
