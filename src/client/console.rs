use log::warn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::{DownloadResult, PeerAgent};
use crate::utils::Result;

const MENU: &str = "\nChoose an action:\n1. Search and Download a File\n2. Exit\nEnter choice: ";

/// Menu-driven loop: search and download until the user exits or input ends.
///
/// Returns once the user chooses to exit; the caller deregisters.
pub async fn run_console<R, W>(agent: &PeerAgent, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(MENU.as_bytes()).await?;
        output.flush().await?;

        let Some(choice) = lines.next_line().await? else {
            return Ok(());
        };

        match choice.trim() {
            "1" => {
                output.write_all(b"Enter filename to search: ").await?;
                output.flush().await?;
                let Some(filename) = lines.next_line().await? else {
                    return Ok(());
                };
                let filename = filename.trim();
                if filename.is_empty() {
                    output.write_all(b"Filename cannot be empty.\n").await?;
                    continue;
                }
                search_and_report(agent, filename, &mut output).await?;
            }
            "2" => {
                output.write_all(b"Exiting...\n").await?;
                output.flush().await?;
                return Ok(());
            }
            other if other.parse::<u32>().is_ok() => {
                output.write_all(b"Invalid choice.\n").await?;
            }
            _ => {
                output
                    .write_all(b"Invalid input. Please enter a number.\n")
                    .await?;
            }
        }
    }
}

async fn search_and_report<W>(agent: &PeerAgent, filename: &str, output: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let downloads = match agent.search_and_download(filename).await {
        Ok(downloads) => downloads,
        Err(e) => {
            warn!("Search for {} failed: {}", filename, e);
            output
                .write_all(format!("Search failed: {}\n", e).as_bytes())
                .await?;
            return Ok(());
        }
    };

    if downloads.is_empty() {
        output
            .write_all(format!("No peers have the file: {}\n", filename).as_bytes())
            .await?;
        return Ok(());
    }

    for download in downloads {
        let peer = &download.peer;
        let line = match download.result {
            DownloadResult::Downloaded { bytes, path } => format!(
                "- {} ({}): downloaded {} bytes to {}\n",
                peer.peer_id,
                peer.serving_addr(),
                bytes,
                path.display()
            ),
            DownloadResult::NotAvailable => format!(
                "- {} ({}): peer does not have the file\n",
                peer.peer_id,
                peer.serving_addr()
            ),
            DownloadResult::Failed(reason) => format!(
                "- {} ({}): failed: {}\n",
                peer.peer_id,
                peer.serving_addr(),
                reason
            ),
        };
        output.write_all(line.as_bytes()).await?;
    }
    Ok(())
}
