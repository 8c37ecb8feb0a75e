use log::{debug, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::network::Transport;
use crate::transfer::{FOUND, NOT_FOUND};
use crate::utils::{IndexError, Result};

/// What a single fetch from one peer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    /// The peer answered `NOT_FOUND`; not an error.
    NotAvailable,
}

/// Pulls one file from a remote peer's file server.
pub struct FileTransferClient;

impl FileTransferClient {
    /// Request `filename` from the peer at `addr` and store it at `destination`.
    ///
    /// Nothing is written locally unless the peer answers `FOUND`. The body
    /// is received into `<destination>.part` and only renamed over
    /// `destination` once the announced length has arrived, so an existing
    /// copy survives a failed transfer. A transfer that ends early fails with
    /// [`IndexError::IncompleteTransfer`] and the partial file is removed.
    pub async fn download(addr: &str, filename: &str, destination: &Path) -> Result<FetchOutcome> {
        let stream = Transport::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        Transport::send_data(&mut writer, format!("{}\n", filename).as_bytes()).await?;

        let status = Transport::expect_line(&mut reader).await?;
        match status.as_str() {
            FOUND => {}
            NOT_FOUND => {
                info!("Peer {} does not have the file: {}", addr, filename);
                return Ok(FetchOutcome::NotAvailable);
            }
            other => {
                return Err(IndexError::ProtocolViolation(format!(
                    "Unexpected response from {}: {:?}",
                    addr, other
                )));
            }
        }

        let size_line = Transport::expect_line(&mut reader).await?;
        let expected: u64 = size_line.trim().parse().map_err(|_| {
            IndexError::ProtocolViolation(format!(
                "Invalid file size from {}: {:?}",
                addr, size_line
            ))
        })?;
        info!("Receiving {} from {} ({} bytes)", filename, addr, expected);

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await?;
            }
        }
        let partial = partial_path(destination);
        let copied = match receive(&mut reader, expected, &partial).await {
            Ok(copied) => copied,
            Err(e) => {
                discard(&partial).await;
                return Err(e);
            }
        };

        if copied < expected {
            discard(&partial).await;
            return Err(IndexError::IncompleteTransfer {
                received: copied,
                expected,
            });
        }

        if let Err(e) = async_fs::rename(&partial, destination).await {
            discard(&partial).await;
            return Err(IndexError::IoError(format!(
                "Failed to move download into {:?}: {}",
                destination, e
            )));
        }

        info!("File {} downloaded to {:?}", filename, destination);
        Ok(FetchOutcome::Downloaded { bytes: copied })
    }
}

/// Copy at most `expected` bytes of body into a fresh file at `path`.
async fn receive<R>(reader: &mut R, expected: u64, path: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let file = async_fs::File::create(path)
        .await
        .map_err(|e| IndexError::IoError(format!("Failed to create {:?}: {}", path, e)))?;
    let mut file = BufWriter::new(file);

    let mut body = reader.take(expected);
    let copied = tokio::io::copy(&mut body, &mut file).await?;
    file.flush().await?;
    Ok(copied)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn discard(path: &Path) {
    debug!("Removing partial download {:?}", path);
    if let Err(e) = async_fs::remove_file(path).await {
        warn!("Failed to remove partial download {:?}: {}", path, e);
    }
}
