pub mod index_server;

pub use index_server::IndexingServer;
