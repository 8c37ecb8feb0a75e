use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::utils::{IndexError, Result};

pub const DEFAULT_SERVER_PORT: u16 = 5000;
pub const DEFAULT_PEER_PORT: u16 = 6000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub peer_id: String,
    /// Host other peers use to reach this peer's file server.
    pub address: String,
    pub port: u16,
    pub bandwidth: f64,
    /// `host:port` of the indexing server.
    pub server_addr: String,
    pub shared_dir: PathBuf,
    pub download_dir: PathBuf,
    pub scan_interval_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            peer_id: format!("peer-{}", Uuid::new_v4().simple()),
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PEER_PORT,
            bandwidth: 100.0,
            server_addr: format!("127.0.0.1:{}", DEFAULT_SERVER_PORT),
            shared_dir: PathBuf::from("./shared"),
            download_dir: PathBuf::from("./downloads"),
            scan_interval_secs: 2,
        }
    }
}

impl PeerConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IndexError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PeerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("peer_id", &self.peer_id), ("address", &self.address)] {
            if !crate::core::protocol::is_valid_token(value) {
                return Err(IndexError::ConfigError(format!(
                    "{} must be a single non-empty token, got {:?}",
                    field, value
                )));
            }
        }
        if self.port == 0 {
            return Err(IndexError::ConfigError("port must be non-zero".to_string()));
        }
        if !self.bandwidth.is_finite() || self.bandwidth < 0.0 {
            return Err(IndexError::ConfigError(format!(
                "bandwidth must be a non-negative number, got {}",
                self.bandwidth
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
