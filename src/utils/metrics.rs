use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ServerMetrics {
    pub connections_accepted: u64,
    pub connections_failed: u64,
    pub registrations: u64,
    pub searches: u64,
    pub deregistrations: u64,
    pub rejected_requests: u64,
    pub files_served: u64,
    pub files_missing: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime: Duration,
    pub start_time: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            connections_accepted: 0,
            connections_failed: 0,
            registrations: 0,
            searches: 0,
            deregistrations: 0,
            rejected_requests: 0,
            files_served: 0,
            files_missing: 0,
            bytes_sent: 0,
            bytes_received: 0,
            uptime: Duration::new(0, 0),
            start_time: Instant::now(),
        }
    }
}

/// Request kinds counted by [`MetricsCollector::record_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Register,
    Search,
    Deregister,
    Rejected,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ServerMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_connection_accepted(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.connections_accepted += 1;
    }

    pub async fn record_connection_failed(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.connections_failed += 1;
    }

    pub async fn record_request(&self, kind: RequestKind) {
        let mut metrics = self.metrics.write().await;
        match kind {
            RequestKind::Register => metrics.registrations += 1,
            RequestKind::Search => metrics.searches += 1,
            RequestKind::Deregister => metrics.deregistrations += 1,
            RequestKind::Rejected => metrics.rejected_requests += 1,
        }
    }

    pub async fn record_file_served(&self, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.files_served += 1;
        metrics.bytes_sent += bytes;
    }

    pub async fn record_file_missing(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.files_missing += 1;
    }

    pub async fn record_bytes_received(&self, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.bytes_received += bytes;
    }

    pub async fn get_metrics(&self) -> ServerMetrics {
        let mut metrics = self.metrics.read().await.clone();
        metrics.uptime = metrics.start_time.elapsed();
        metrics
    }

    pub async fn print_stats(&self) {
        let metrics = self.get_metrics().await;

        println!("\n=== Server Statistics ===");
        println!("Uptime: {:.2?}", metrics.uptime);
        println!(
            "Connections: {} accepted, {} failed",
            metrics.connections_accepted, metrics.connections_failed
        );
        // The index and the file server share this type; skip the other's section.
        if metrics.registrations + metrics.searches + metrics.deregistrations
            + metrics.rejected_requests
            > 0
        {
            println!(
                "Requests: {} register, {} search, {} deregister, {} rejected",
                metrics.registrations,
                metrics.searches,
                metrics.deregistrations,
                metrics.rejected_requests
            );
        }
        if metrics.files_served + metrics.files_missing > 0 {
            println!(
                "Files: {} served, {} not found",
                metrics.files_served, metrics.files_missing
            );
        }
        println!(
            "Data Transfer: {} bytes sent, {} bytes received",
            metrics.bytes_sent, metrics.bytes_received
        );
        println!("=========================\n");
    }
}
