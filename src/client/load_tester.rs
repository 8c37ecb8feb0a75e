use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::client::IndexClient;
use crate::utils::{IndexError, Result};

const CSV_HEADER: &str = "N,Timestamp,TestType,Threads,ResponseTime\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Sequential,
    Concurrent,
}

impl TestKind {
    fn label(self) -> &'static str {
        match self {
            TestKind::Sequential => "Sequential",
            TestKind::Concurrent => "Concurrent",
        }
    }
}

/// Measures SEARCH round-trip latency against an indexing server, using only
/// the wire protocol, and appends the samples to a CSV file.
#[derive(Debug, Clone)]
pub struct LoadTester {
    server_addr: String,
    filename: String,
    log_path: PathBuf,
}

impl LoadTester {
    pub fn new(
        server_addr: impl Into<String>,
        filename: impl Into<String>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            server_addr: server_addr.into(),
            filename: filename.into(),
            log_path,
        }
    }

    /// One SEARCH on a fresh connection; latency in milliseconds, measured
    /// from sending the request to reading the last result line.
    pub async fn search_once(&self) -> Result<f64> {
        let mut client = IndexClient::connect(&self.server_addr).await?;
        let start = Instant::now();
        client.search(&self.filename).await?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    /// `None` marks a failed search.
    pub async fn run_sequential(&self, requests: usize) -> Vec<Option<f64>> {
        info!("Starting {} sequential searches", requests);
        let mut samples = Vec::with_capacity(requests);
        for i in 1..=requests {
            let sample = self.sample().await;
            match sample {
                Some(ms) => info!("Sequential search #{}: {:.2} ms", i, ms),
                None => info!("Sequential search #{}: ERROR", i),
            }
            samples.push(sample);
        }
        samples
    }

    /// `requests` searches with at most `threads` in flight at once.
    pub async fn run_concurrent(&self, threads: usize, requests: usize) -> Vec<Option<f64>> {
        info!(
            "Starting {} concurrent searches with {} workers",
            requests, threads
        );
        let permits = Arc::new(Semaphore::new(threads.max(1)));
        let mut tasks = JoinSet::new();

        for _ in 0..requests {
            let tester = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                tester.sample().await
            });
        }

        let mut samples = Vec::with_capacity(requests);
        while let Some(joined) = tasks.join_next().await {
            let sample = joined.unwrap_or_else(|e| {
                warn!("Search task failed: {}", e);
                None
            });
            samples.push(sample);
        }
        samples
    }

    async fn sample(&self) -> Option<f64> {
        match self.search_once().await {
            Ok(ms) => Some(ms),
            Err(e) => {
                warn!("Error during search: {}", e);
                None
            }
        }
    }

    /// Append samples to the CSV log, writing the header if the file is new.
    pub async fn log_response_times(
        &self,
        samples: &[Option<f64>],
        kind: TestKind,
        threads: usize,
    ) -> Result<()> {
        let is_new = !tokio::fs::try_exists(&self.log_path).await.unwrap_or(false);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(|e| {
                IndexError::IoError(format!("Failed to open {:?}: {}", self.log_path, e))
            })?;

        let mut out = String::new();
        if is_new {
            out.push_str(CSV_HEADER);
        }
        for (i, sample) in samples.iter().enumerate() {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let value = match sample {
                Some(ms) => format!("{:.2}", ms),
                None => "ERROR".to_string(),
            };
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                i + 1,
                timestamp,
                kind.label(),
                threads,
                value
            ));
        }

        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        info!("Logged {} {} response times", samples.len(), kind.label());
        Ok(())
    }

    /// Sequential run, then one concurrent run per entry of `thread_counts`
    /// with `threads * per_thread` searches each.
    pub async fn run(
        &self,
        sequential: usize,
        per_thread: usize,
        thread_counts: &[usize],
    ) -> Result<()> {
        let samples = self.run_sequential(sequential).await;
        self.log_response_times(&samples, TestKind::Sequential, 1)
            .await?;

        for &threads in thread_counts {
            let samples = self.run_concurrent(threads, threads * per_thread).await;
            self.log_response_times(&samples, TestKind::Concurrent, threads)
                .await?;
        }

        info!("Performance testing completed, results in {:?}", self.log_path);
        Ok(())
    }
}
