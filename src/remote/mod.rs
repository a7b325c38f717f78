//! Remote table locations and the transport that copies files to and from
//! them.

pub mod locator;
pub mod openssh;
pub mod staging;
pub mod transport;

pub use locator::{is_remote, resolve, RemoteLocation, ServerKey};
pub use openssh::{openssh_transport, OpenSshConnector};
pub use staging::StagingArea;
pub use transport::{Connection, ConnectionPool, Connector, PooledTransport, RemoteTransport};
