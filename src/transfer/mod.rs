//! Direct peer-to-peer file transfer.
//!
//! ```text
//! client -> server: <filename>\n
//! server -> client: FOUND\n<byteLength>\n<raw bytes>   |   NOT_FOUND\n
//! ```

pub mod downloader;
pub mod uploader;

pub use downloader::{FetchOutcome, FileTransferClient};
pub use uploader::FileTransferServer;

pub const FOUND: &str = "FOUND";
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Write size used when streaming file bodies; not part of the wire format.
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SharedDir;
    use crate::utils::IndexError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn start_server(dir: &std::path::Path) -> String {
        let shared = SharedDir::new(dir.to_path_buf()).await.unwrap();
        let (addr, _handle) = FileTransferServer::new(shared)
            .spawn("127.0.0.1:0")
            .await
            .unwrap();
        addr.to_string()
    }

    #[tokio::test]
    async fn test_round_trip_is_byte_identical() {
        let shared = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..(TRANSFER_CHUNK_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(shared.path().join("blob.bin"), &content).unwrap();

        let addr = start_server(shared.path()).await;
        let dest = downloads.path().join("blob.bin");
        let outcome = FileTransferClient::download(&addr, "blob.bin", &dest)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Downloaded {
                bytes: content.len() as u64
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), content);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let shared = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("empty.txt"), b"").unwrap();

        let addr = start_server(shared.path()).await;
        let dest = downloads.path().join("empty.txt");
        let outcome = FileTransferClient::download(&addr, "empty.txt", &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 0 });
        assert!(std::fs::read(&dest).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_available() {
        let shared = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();

        let addr = start_server(shared.path()).await;
        let dest = downloads.path().join("missing.txt");
        let outcome = FileTransferClient::download(&addr, "missing.txt", &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NotAvailable);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_path_escape_is_not_found_on_the_wire() {
        let shared = tempfile::tempdir().unwrap();
        let addr = start_server(shared.path()).await;

        let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        stream.write_all(b"../../etc/passwd\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert_eq!(response, "NOT_FOUND\n");
    }

    #[tokio::test]
    async fn test_unopenable_file_is_not_found_on_the_wire() {
        let shared = tempfile::tempdir().unwrap();
        let addr = start_server(shared.path()).await;

        // A single path component longer than any filesystem allows.
        let name = "n".repeat(4096);
        let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(format!("{}\n", name).as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert_eq!(response, "NOT_FOUND\n");
    }

    #[tokio::test]
    async fn test_served_files_are_counted() {
        let shared = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("a.txt"), b"hello").unwrap();

        let metrics = crate::utils::MetricsCollector::new();
        let server = FileTransferServer::with_metrics(
            SharedDir::new(shared.path().to_path_buf()).await.unwrap(),
            metrics.clone(),
        );
        let (addr, _handle) = server.spawn("127.0.0.1:0").await.unwrap();
        let addr = addr.to_string();

        let dest = downloads.path().join("a.txt");
        FileTransferClient::download(&addr, "a.txt", &dest)
            .await
            .unwrap();
        FileTransferClient::download(&addr, "b.txt", &dest)
            .await
            .unwrap();

        // The server records after the body is on the wire; give it a moment.
        let mut snapshot = metrics.get_metrics().await;
        for _ in 0..50 {
            if snapshot.files_served == 1 && snapshot.files_missing == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            snapshot = metrics.get_metrics().await;
        }
        assert_eq!(snapshot.files_served, 1);
        assert_eq!(snapshot.files_missing, 1);
        assert_eq!(snapshot.bytes_sent, 5);
    }

    #[tokio::test]
    async fn test_server_announces_length_then_closes() {
        let shared = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("a.txt"), b"hello").unwrap();
        let addr = start_server(shared.path()).await;

        let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        stream.write_all(b"a.txt\n").await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();

        assert_eq!(response, b"FOUND\n5\nhello");
    }

    #[tokio::test]
    async fn test_short_transfer_is_reported_and_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut BufReader::new(reader), &mut line)
                .await
                .unwrap();
            writer.write_all(b"FOUND\n10\nabc").await.unwrap();
        });

        let downloads = tempfile::tempdir().unwrap();
        let dest = downloads.path().join("cut.txt");
        std::fs::write(&dest, b"earlier copy").unwrap();
        let err = FileTransferClient::download(&addr, "cut.txt", &dest)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IndexError::IncompleteTransfer {
                received: 3,
                expected: 10
            }
        ));
        assert_eq!(std::fs::read(&dest).unwrap(), b"earlier copy");
        assert!(!downloads.path().join("cut.txt.part").exists());
    }

    #[tokio::test]
    async fn test_unexpected_status_is_protocol_violation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut BufReader::new(reader), &mut line)
                .await
                .unwrap();
            writer.write_all(b"MAYBE\n").await.unwrap();
        });

        let downloads = tempfile::tempdir().unwrap();
        let err = FileTransferClient::download(&addr, "x", &downloads.path().join("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::ProtocolViolation(_)));
    }
}
