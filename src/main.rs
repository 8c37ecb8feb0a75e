use clap::{Parser, Subcommand};
use log::{LevelFilter, info, warn};
use p2p_index::client::{DirectoryWatcher, IndexClient, LoadTester, PeerAgent, run_console};
use p2p_index::core::{DEFAULT_SERVER_PORT, PeerConfig, ServerConfig};
use p2p_index::utils::setup_logging;
use p2p_index::{IndexingServer, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "p2p-index")]
#[command(about = "Centrally indexed peer-to-peer file sharing")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexing server
    Server {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },
    /// Run a peer: serve, register, watch the shared directory, interactive menu
    Peer {
        /// JSON config file; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Peer identifier
        #[arg(long)]
        id: Option<String>,
        /// Address other peers use to reach this peer
        #[arg(long)]
        address: Option<String>,
        /// Port of this peer's file server
        #[arg(short, long)]
        port: Option<u16>,
        /// Advertised bandwidth
        #[arg(long)]
        bandwidth: Option<f64>,
        /// Indexing server address (host:port)
        #[arg(short, long)]
        server: Option<String>,
        /// Directory to share files from
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Directory downloads are written to
        #[arg(long)]
        downloads: Option<PathBuf>,
        /// Do not watch the shared directory for changes
        #[arg(long)]
        no_watch: bool,
    },
    /// Search the index once and print the matching peers
    Search {
        /// Indexing server address (host:port)
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        server: String,
        /// File name to search for
        #[arg(short, long)]
        file: String,
    },
    /// Measure SEARCH latency and append results to a CSV file
    Bench {
        /// Indexing server address (host:port)
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        server: String,
        /// File name to search for
        #[arg(short, long)]
        file: String,
        /// Number of sequential searches
        #[arg(long, default_value_t = 100)]
        sequential: usize,
        /// Searches per worker in each concurrent run
        #[arg(long, default_value_t = 10)]
        per_thread: usize,
        /// Worker counts for the concurrent runs
        #[arg(long, value_delimiter = ',', default_value = "5,10,20,50")]
        threads: Vec<usize>,
        /// CSV file to append results to
        #[arg(short, long, default_value = "performance_log.csv")]
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level);

    match cli.command {
        Commands::Server { port, bind } => {
            let config = ServerConfig {
                bind_addr: bind,
                port,
            };
            IndexingServer::new().run(&config).await?;
        }
        Commands::Peer {
            config,
            id,
            address,
            port,
            bandwidth,
            server,
            dir,
            downloads,
            no_watch,
        } => {
            let mut config = match config {
                Some(path) => PeerConfig::from_file(&path)?,
                None => PeerConfig::default(),
            };
            if let Some(id) = id {
                config.peer_id = id;
            }
            if let Some(address) = address {
                config.address = address;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bandwidth) = bandwidth {
                config.bandwidth = bandwidth;
            }
            if let Some(server) = server {
                config.server_addr = server;
            }
            if let Some(dir) = dir {
                config.shared_dir = dir;
            }
            if let Some(downloads) = downloads {
                config.download_dir = downloads;
            }

            run_peer(config, !no_watch).await?;
        }
        Commands::Search { server, file } => {
            let mut client = IndexClient::connect(&server).await?;
            let peers = client.search(&file).await?;

            println!("{} peer(s) have {}:", peers.len(), file);
            for peer in peers {
                println!(
                    "  {} at {} (bandwidth {})",
                    peer.peer_id,
                    peer.serving_addr(),
                    peer.bandwidth
                );
            }
        }
        Commands::Bench {
            server,
            file,
            sequential,
            per_thread,
            threads,
            log,
        } => {
            LoadTester::new(server, file, log)
                .run(sequential, per_thread, &threads)
                .await?;
        }
    }

    Ok(())
}

async fn run_peer(config: PeerConfig, watch: bool) -> Result<()> {
    let scan_period = Duration::from_secs(config.scan_interval_secs.max(1));
    let agent = Arc::new(PeerAgent::new(config).await?);

    let (addr, server) = agent.serve().await?;
    info!(
        "Peer {} serving {:?} on {}",
        agent.record().peer_id,
        agent.shared_dir().root(),
        addr
    );

    let files = agent.shared_files().await?;
    agent.register_all(&files).await?;

    let watcher = watch.then(|| {
        DirectoryWatcher::new(agent.clone(), files.iter().cloned().collect(), scan_period).spawn()
    });

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = run_console(&agent, stdin, tokio::io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, shutting down"),
    }

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    let files = agent.shared_files().await.unwrap_or(files);
    if let Err(e) = agent.deregister_all(&files).await {
        warn!("Failed to deregister on exit: {}", e);
    }
    server.abort();
    agent.metrics().print_stats().await;
    Ok(())
}
