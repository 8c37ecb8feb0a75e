use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::network::Transport;
use crate::utils::{MetricsCollector, Result};

/// Per-connection protocol logic, independent of how connections are accepted
/// and scheduled.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Accept loop that runs one task per inbound connection.
///
/// A failing or panicking handler only ends its own task; the loop keeps
/// accepting.
pub struct ConnectionAcceptor {
    name: &'static str,
    listener: TcpListener,
    metrics: MetricsCollector,
}

impl ConnectionAcceptor {
    /// Bind `addr`. Failing to bind is the only fatal error of a server.
    pub async fn bind(name: &'static str, addr: &str, metrics: MetricsCollector) -> Result<Self> {
        let listener = Transport::listen(addr).await?;
        info!("{} bound to {}", name, listener.local_addr()?);
        Ok(Self {
            name,
            listener,
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run<H: ConnectionHandler>(self, handler: Arc<H>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("{}: new connection from {}", self.name, addr);
                    self.metrics.record_connection_accepted().await;

                    let handler = handler.clone();
                    let metrics = self.metrics.clone();
                    let name = self.name;
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream, addr).await {
                            warn!("{}: connection with {} failed: {}", name, addr, e);
                            metrics.record_connection_failed().await;
                        }
                        debug!("{}: closed connection with {}", name, addr);
                    });
                }
                Err(e) => {
                    error!("{}: failed to accept connection: {}", self.name, e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub fn spawn<H: ConnectionHandler>(self, handler: Arc<H>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }
}
