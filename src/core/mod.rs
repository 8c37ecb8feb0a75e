pub mod config;
pub mod peer;
pub mod protocol;
pub mod registry;

pub use config::{DEFAULT_PEER_PORT, DEFAULT_SERVER_PORT, PeerConfig, ServerConfig};
pub use peer::PeerRecord;
pub use protocol::{Request, Response};
pub use registry::{Deregistration, Registry};
