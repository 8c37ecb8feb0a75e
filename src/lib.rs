//! Centrally indexed P2P file sharing.
//!
//! An indexing server tracks which peers share which files over a
//! line-oriented control protocol; peers then fetch files directly from one
//! another.

pub mod client;
pub mod core;
pub mod network;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use client::{IndexClient, PeerAgent};
pub use crate::core::{PeerConfig, PeerRecord, Registry, ServerConfig};
pub use server::IndexingServer;
pub use transfer::{FileTransferClient, FileTransferServer};
pub use utils::error::{IndexError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
