use log::debug;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::core::PeerRecord;
use crate::core::protocol::{REASON_PEER_NOT_FOUND, Request, Response, ResponseHead};
use crate::network::Transport;
use crate::utils::{IndexError, Result};

/// A control connection to the indexing server.
///
/// Requests on one connection are answered strictly in order, so the client
/// needs no request ids: it writes a line and reads the matching response.
pub struct IndexClient {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IndexClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = Transport::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        debug!("Control connection open to {}", addr);

        Ok(Self {
            addr: addr.to_string(),
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one request and read its full response.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let line = request.encode();
        debug!("-> {}: {}", self.addr, line.trim_end());
        Transport::send_data(&mut self.writer, line.as_bytes()).await?;

        let head = Transport::expect_line(&mut self.reader).await?;
        let response = match Response::decode_head(&head)? {
            ResponseHead::Complete(response) => response,
            ResponseHead::SearchResults(count) => {
                let mut peers = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let line = Transport::expect_line(&mut self.reader).await?;
                    peers.push(Response::decode_peer_line(&line)?);
                }
                Response::SearchResults(peers)
            }
        };

        debug!("<- {}: {}", self.addr, head);
        Ok(response)
    }

    pub async fn register(&mut self, record: &PeerRecord, files: Vec<String>) -> Result<()> {
        match self.request(&Request::register(record.clone(), files)).await? {
            Response::RegisterSuccess => Ok(()),
            other => Err(Self::rejected(other)),
        }
    }

    pub async fn search(&mut self, filename: &str) -> Result<Vec<PeerRecord>> {
        match self.request(&Request::search(filename)).await? {
            Response::SearchResults(peers) => Ok(peers),
            other => Err(Self::rejected(other)),
        }
    }

    /// Returns `false` when the server did not know the peer.
    pub async fn deregister(&mut self, peer_id: &str, files: Vec<String>) -> Result<bool> {
        match self.request(&Request::deregister(peer_id, files)).await? {
            Response::DeregisterSuccess => Ok(true),
            Response::DeregisterFailure(reason) if reason == REASON_PEER_NOT_FOUND => Ok(false),
            other => Err(Self::rejected(other)),
        }
    }

    fn rejected(response: Response) -> IndexError {
        if response.is_failure() {
            IndexError::ServerRejected(response.to_string())
        } else {
            IndexError::ProtocolViolation(format!("Mismatched response: {}", response))
        }
    }
}
