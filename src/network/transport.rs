use log::info;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::utils::{IndexError, Result};

/// Longest status line accepted from the wire, newline included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Longest control request the indexing server accepts. A REGISTER carries
/// every shared filename on one line, so this is far above [`MAX_LINE_LEN`].
pub const MAX_REQUEST_LEN: usize = 8 * 1024 * 1024;

/// One line read under a length limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    /// The line went past the limit. The rest of it, up to and including the
    /// newline, has been consumed; only the leading `limit` bytes are kept.
    Oversized(String),
    Closed,
}

pub struct Transport;

impl Transport {
    pub async fn connect(addr: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            IndexError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
        })?;

        stream
            .set_nodelay(true)
            .map_err(|e| IndexError::NetworkError(format!("Failed to set TCP_NODELAY: {}", e)))?;
        Ok(stream)
    }

    pub async fn listen(addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IndexError::NetworkError(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Read one line without its `\n` / `\r\n` terminator.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A final line that is not
    /// newline-terminated is still returned. Lines over [`MAX_LINE_LEN`] are
    /// a protocol violation.
    pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        match Self::read_line_bounded(reader, MAX_LINE_LEN).await? {
            LineRead::Line(line) => Ok(Some(line)),
            LineRead::Oversized(_) => Err(IndexError::ProtocolViolation(format!(
                "Line exceeds {} bytes",
                MAX_LINE_LEN
            ))),
            LineRead::Closed => Ok(None),
        }
    }

    /// Read one line of at most `limit` bytes, newline included.
    ///
    /// An oversized line is drained to its newline so the stream stays
    /// aligned on the next line.
    pub async fn read_line_bounded<R>(reader: &mut R, limit: usize) -> Result<LineRead>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut oversized = false;
        let mut seen_any = false;

        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            seen_any = true;

            let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let used = chunk.len();
            if !oversized {
                if buf.len() + used > limit {
                    buf.extend_from_slice(&chunk[..limit - buf.len()]);
                    oversized = true;
                } else {
                    buf.extend_from_slice(chunk);
                }
            }
            reader.consume(used);

            if done {
                break;
            }
        }

        if !seen_any {
            return Ok(LineRead::Closed);
        }
        if oversized {
            return Ok(LineRead::Oversized(
                String::from_utf8_lossy(&buf).into_owned(),
            ));
        }

        let mut line = String::from_utf8(buf)
            .map_err(|_| IndexError::ProtocolViolation("Line is not valid UTF-8".to_string()))?;
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(LineRead::Line(line))
    }

    /// Like [`Transport::read_line`] but treats end of stream as an error.
    pub async fn expect_line<R>(reader: &mut R) -> Result<String>
    where
        R: AsyncBufRead + Unpin,
    {
        Self::read_line(reader).await?.ok_or_else(|| {
            IndexError::ConnectionFailed("Connection closed by remote".to_string())
        })
    }

    pub async fn send_data<W>(writer: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }
}
