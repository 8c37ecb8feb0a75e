use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::network::{ConnectionAcceptor, ConnectionHandler, Transport};
use crate::storage::SharedDir;
use crate::transfer::{FOUND, NOT_FOUND, TRANSFER_CHUNK_SIZE};
use crate::utils::{IndexError, MetricsCollector, Result};

/// Serves files from a peer's shared directory, one request per connection:
/// `<filename>\n` in, then `FOUND\n<len>\n<bytes>` or `NOT_FOUND\n` out.
pub struct FileTransferServer {
    shared: SharedDir,
    metrics: MetricsCollector,
}

impl FileTransferServer {
    pub fn new(shared: SharedDir) -> Self {
        Self::with_metrics(shared, MetricsCollector::new())
    }

    pub fn with_metrics(shared: SharedDir, metrics: MetricsCollector) -> Self {
        Self { shared, metrics }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Bind `addr` and serve in the background.
    pub async fn spawn(self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>)> {
        let acceptor = ConnectionAcceptor::bind("file-server", addr, self.metrics.clone()).await?;
        let local = acceptor.local_addr()?;
        Ok((local, acceptor.spawn(Arc::new(self))))
    }

    async fn serve_file(&self, stream: &mut TcpStream, addr: SocketAddr) -> Result<()> {
        let requested = {
            let mut reader = BufReader::new(&mut *stream);
            Transport::read_line(&mut reader).await?
        };
        let Some(requested) = requested else {
            debug!("{} closed before sending a filename", addr);
            return Ok(());
        };
        info!("Peer {} requested file: {}", addr, requested);

        let opened = self.shared.open(&requested).await.unwrap_or_else(|e| {
            warn!("Cannot open {} for {}: {}", requested, addr, e);
            None
        });
        let Some((mut file, len)) = opened else {
            Transport::send_data(stream, format!("{}\n", NOT_FOUND).as_bytes()).await?;
            self.metrics.record_file_missing().await;
            info!("File {} not found", requested);
            return Ok(());
        };

        stream
            .write_all(format!("{}\n{}\n", FOUND, len).as_bytes())
            .await?;

        let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut sent: u64 = 0;
        while sent < len {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            // Never send more than announced, even if the file grew meanwhile.
            let take = read.min((len - sent) as usize);
            stream.write_all(&buffer[..take]).await?;
            sent += take as u64;
        }
        stream.flush().await?;

        if sent < len {
            // The file shrank after the length was announced; the client
            // sees a short transfer when we close.
            return Err(IndexError::IncompleteTransfer {
                received: sent,
                expected: len,
            });
        }

        self.metrics.record_file_served(sent).await;
        info!("File {} sent to {} ({} bytes)", requested, addr, sent);
        Ok(())
    }
}

impl ConnectionHandler for FileTransferServer {
    async fn handle(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let result = self.serve_file(&mut stream, addr).await;
        // One request per connection, whatever the outcome.
        let _ = stream.shutdown().await;
        result
    }
}
