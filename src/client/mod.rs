//! Peer-side components: the control-protocol client, the agent that drives
//! it, and the collaborators built on top (directory watcher, console menu,
//! load tester).

pub mod agent;
pub mod console;
pub mod index_client;
pub mod load_tester;
pub mod watcher;

pub use agent::{DownloadResult, PeerAgent, PeerDownload, REGISTER_BATCH};
pub use console::run_console;
pub use index_client::IndexClient;
pub use load_tester::{LoadTester, TestKind};
pub use watcher::{DirectoryChanges, DirectoryWatcher};
