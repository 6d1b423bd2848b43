//! Network Module
//!
//! TCP transport to the cache server.
//!
//! ## Architecture
//! - One [`Connection`] per socket, one request in flight at a time
//! - [`ConnectionPool`] hands out independent connections to concurrent callers
//! - SASL PLAIN handshake before any request is accepted

mod connection;
mod pool;

pub use connection::{Connection, ConnectionState};
pub use pool::{ConnectionPool, PooledConnection};
