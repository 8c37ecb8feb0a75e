pub mod connection;
pub mod transport;

pub use connection::{ConnectionAcceptor, ConnectionHandler};
pub use transport::{LineRead, Transport};
