use p2p_index::client::{
    DirectoryWatcher, DownloadResult, LoadTester, REGISTER_BATCH, TestKind, run_console,
};
use p2p_index::{IndexClient, IndexingServer, PeerAgent, PeerConfig, PeerRecord, ServerConfig};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::Duration;

async fn start_index() -> SocketAddr {
    let config = ServerConfig {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
    };
    let (addr, _handle) = IndexingServer::new().spawn(&config).await.unwrap();
    addr
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

struct TestPeer {
    agent: Arc<PeerAgent>,
    shared: TempDir,
    downloads: TempDir,
}

async fn start_peer(id: &str, index: SocketAddr, files: &[(&str, &[u8])]) -> TestPeer {
    let shared = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(shared.path().join(name), content).unwrap();
    }

    let config = PeerConfig {
        peer_id: id.to_string(),
        address: "127.0.0.1".to_string(),
        port: free_port(),
        bandwidth: 100.0,
        server_addr: index.to_string(),
        shared_dir: shared.path().to_path_buf(),
        download_dir: downloads.path().to_path_buf(),
        scan_interval_secs: 1,
    };
    let agent = Arc::new(PeerAgent::new(config).await.unwrap());
    agent.serve().await.unwrap();
    let listed = agent.shared_files().await.unwrap();
    agent.register_all(&listed).await.unwrap();

    TestPeer {
        agent,
        shared,
        downloads,
    }
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[tokio::test]
async fn test_search_and_download_from_remote_peer() {
    let index = start_index().await;
    let content = b"peer to peer payload".repeat(5000);
    let alice = start_peer("alice", index, &[("a.txt", &content[..])]).await;
    let bob = start_peer("bob", index, &[]).await;

    let results = bob.agent.search_and_download("a.txt").await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].peer.peer_id, "alice");
    let expected_path = bob.downloads.path().join("a.txt");
    assert_eq!(
        results[0].result,
        DownloadResult::Downloaded {
            bytes: content.len() as u64,
            path: expected_path.clone(),
        }
    );
    assert_eq!(read(&expected_path), content);
    drop(alice);
}

/// A peer that answers every request with a body shorter than announced.
async fn start_truncating_peer(id: &str, index: SocketAddr, filename: &str) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            writer.write_all(b"FOUND\n10\nabc").await.unwrap();
        }
    });

    let record = PeerRecord::new(id, "127.0.0.1", port, 1.0);
    let mut client = IndexClient::connect(&index.to_string()).await.unwrap();
    client
        .register(&record, vec![filename.to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_download_keeps_earlier_copy() {
    let index = start_index().await;
    let _alice = start_peer("alice", index, &[("f.txt", &b"good copy"[..])]).await;
    start_truncating_peer("zed", index, "f.txt").await;
    let bob = start_peer("bob", index, &[]).await;

    let results = bob.agent.search_and_download("f.txt").await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].peer.peer_id, "alice");
    assert!(matches!(
        results[0].result,
        DownloadResult::Downloaded { bytes: 9, .. }
    ));
    assert_eq!(results[1].peer.peer_id, "zed");
    assert!(matches!(results[1].result, DownloadResult::Failed(_)));

    let destination = bob.downloads.path().join("f.txt");
    assert_eq!(read(&destination), b"good copy");
    assert!(!bob.downloads.path().join("f.txt.part").exists());
    assert_eq!(bob.agent.metrics().get_metrics().await.bytes_received, 9);
}

#[tokio::test]
async fn test_search_skips_own_registration() {
    let index = start_index().await;
    let alice = start_peer("alice", index, &[("a.txt", &b"mine"[..])]).await;

    let results = alice.agent.search_and_download("a.txt").await.unwrap();
    assert!(results.is_empty());
    assert_eq!(alice.agent.search("a.txt").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_index_entry_reports_not_available() {
    let index = start_index().await;
    let alice = start_peer("alice", index, &[]).await;
    let bob = start_peer("bob", index, &[]).await;

    // Advertised but never present on disk.
    alice
        .agent
        .register_all(&["ghost.txt".to_string()])
        .await
        .unwrap();

    let results = bob.agent.search_and_download("ghost.txt").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, DownloadResult::NotAvailable);
    assert!(!bob.downloads.path().join("ghost.txt").exists());
}

#[tokio::test]
async fn test_unreachable_peer_is_reported_as_failed() {
    let index = start_index().await;
    let bob = start_peer("bob", index, &[]).await;

    let config = PeerConfig {
        peer_id: "offline".to_string(),
        port: free_port(),
        server_addr: index.to_string(),
        shared_dir: bob.shared.path().join("offline-shared"),
        download_dir: bob.shared.path().join("offline-downloads"),
        ..PeerConfig::default()
    };
    // Registered but never serving.
    let offline = PeerAgent::new(config).await.unwrap();
    offline.register_all(&["x.txt".to_string()]).await.unwrap();

    let results = bob.agent.search_and_download("x.txt").await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].result, DownloadResult::Failed(_)));
}

#[tokio::test]
async fn test_register_all_splits_large_file_sets() {
    let index = start_index().await;
    let alice = start_peer("alice", index, &[]).await;
    let files: Vec<String> = (0..REGISTER_BATCH * 2 + 5)
        .map(|i| format!("file-{i}.txt"))
        .collect();

    alice.agent.register_all(&files).await.unwrap();

    for name in [&files[0], &files[REGISTER_BATCH], &files[files.len() - 1]] {
        assert_eq!(alice.agent.search(name).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_file_deletion_deregisters_whole_peer() {
    let index = start_index().await;
    let alice = start_peer("alice", index, &[("a.txt", &b"a"[..]), ("b.txt", &b"b"[..])]).await;

    alice.agent.on_file_deleted("a.txt").await.unwrap();

    assert!(alice.agent.search("a.txt").await.unwrap().is_empty());
    assert!(alice.agent.search("b.txt").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_watcher_reports_created_and_deleted_files() {
    let index = start_index().await;
    let alice = start_peer("alice", index, &[("a.txt", &b"a"[..])]).await;
    let known: BTreeSet<String> = ["a.txt".to_string()].into_iter().collect();
    let mut watcher = DirectoryWatcher::new(alice.agent.clone(), known, Duration::from_secs(1));

    assert!(watcher.check_once().await.unwrap().is_empty());

    std::fs::write(alice.shared.path().join("new.txt"), b"fresh").unwrap();
    let changes = watcher.check_once().await.unwrap();
    assert_eq!(changes.created, vec!["new.txt"]);
    assert!(changes.deleted.is_empty());
    assert_eq!(alice.agent.search("new.txt").await.unwrap().len(), 1);

    std::fs::remove_file(alice.shared.path().join("new.txt")).unwrap();
    let changes = watcher.check_once().await.unwrap();
    assert_eq!(changes.deleted, vec!["new.txt"]);
    assert!(alice.agent.search("a.txt").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_console_search_then_exit() {
    let index = start_index().await;
    let _alice = start_peer("alice", index, &[("a.txt", &b"hello"[..])]).await;
    let bob = start_peer("bob", index, &[]).await;

    let input: &[u8] = b"x\n7\n1\n\n1\na.txt\n1\nnone.txt\n2\n";
    let mut output = Vec::new();
    run_console(&bob.agent, input, &mut output).await.unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("Invalid input. Please enter a number."));
    assert!(output.contains("Invalid choice."));
    assert!(output.contains("Filename cannot be empty."));
    assert!(output.contains("- alice (127.0.0.1:"));
    assert!(output.contains("downloaded 5 bytes"));
    assert!(output.contains("No peers have the file: none.txt"));
    assert!(output.ends_with("Exiting...\n"));
    assert_eq!(read(&bob.downloads.path().join("a.txt")), b"hello");
}

#[tokio::test]
async fn test_load_tester_writes_csv() {
    let index = start_index().await;
    let _alice = start_peer("alice", index, &[("a.txt", &b"a"[..])]).await;
    let logs = tempfile::tempdir().unwrap();
    let log_path = logs.path().join("perf.csv");
    let tester = LoadTester::new(index.to_string(), "a.txt", log_path.clone());

    let sequential = tester.run_sequential(3).await;
    assert_eq!(sequential.len(), 3);
    assert!(sequential.iter().all(Option::is_some));
    tester
        .log_response_times(&sequential, TestKind::Sequential, 1)
        .await
        .unwrap();

    let concurrent = tester.run_concurrent(2, 4).await;
    assert_eq!(concurrent.len(), 4);
    tester
        .log_response_times(&concurrent, TestKind::Concurrent, 2)
        .await
        .unwrap();

    let csv = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "N,Timestamp,TestType,Threads,ResponseTime");
    assert_eq!(lines.len(), 1 + 3 + 4);
    assert!(lines[1].starts_with("1,"));
    assert!(lines[1].contains(",Sequential,1,"));
    assert!(lines[7].contains(",Concurrent,2,"));
}

#[tokio::test]
async fn test_load_tester_records_errors() {
    let logs = tempfile::tempdir().unwrap();
    let tester = LoadTester::new(
        format!("127.0.0.1:{}", free_port()),
        "a.txt",
        logs.path().join("perf.csv"),
    );

    let samples = tester.run_sequential(2).await;
    assert_eq!(samples, vec![None, None]);
    tester
        .log_response_times(&samples, TestKind::Sequential, 1)
        .await
        .unwrap();

    let csv = std::fs::read_to_string(logs.path().join("perf.csv")).unwrap();
    assert!(csv.lines().skip(1).all(|line| line.ends_with(",ERROR")));
}
