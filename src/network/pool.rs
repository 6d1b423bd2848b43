//! Connection Pool
//!
//! A bounded set of independent authenticated connections. Each checkout owns
//! its connection exclusively, so requests never interleave on a socket.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::channel::{self, Receiver, Sender};

use super::Connection;
use crate::config::{ClientConfig, Credentials, Endpoint, Timeouts};
use crate::error::{CacheError, Result};

/// Pool of connections to one server
pub struct ConnectionPool {
    endpoint: Endpoint,

    credentials: Credentials,

    timeouts: Timeouts,

    /// Upper bound on live connections (idle + checked out)
    max_size: usize,

    /// Idle connections
    idle_tx: Sender<Connection>,
    idle_rx: Receiver<Connection>,

    /// Live connections
    total: AtomicUsize,

    /// Set by `close`; no checkouts or new connections after this
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool and open its first connection
    ///
    /// Opening one connection up front surfaces bad credentials immediately.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let (idle_tx, idle_rx) = channel::bounded(config.pool_size);
        let pool = Self {
            endpoint: config.endpoint.clone(),
            credentials: config.credentials.clone(),
            timeouts: config.timeouts(),
            max_size: config.pool_size,
            idle_tx,
            idle_rx,
            total: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        };

        let first = pool.open_connection()?;
        pool.release(first);

        tracing::debug!(
            "Connection pool for {} ready (max {} connections)",
            pool.endpoint,
            pool.max_size
        );
        Ok(pool)
    }

    /// Check out a connection
    ///
    /// Reuses an idle connection, opens a new one while below the limit, or
    /// waits up to the op timeout for one to be returned.
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        self.ensure_open()?;

        if let Ok(connection) = self.idle_rx.try_recv() {
            return Ok(PooledConnection::new(self, connection));
        }

        if let Some(connection) = self.try_grow()? {
            return Ok(PooledConnection::new(self, connection));
        }

        tracing::trace!("Pool for {} exhausted, waiting", self.endpoint);
        match self.idle_rx.recv_timeout(self.timeouts.op) {
            Ok(connection) => Ok(PooledConnection::new(self, connection)),
            Err(_) => {
                self.ensure_open()?;
                Err(CacheError::Timeout(self.timeouts.op.as_millis() as u64))
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::NotConnected(format!(
                "pool for {} is closed",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Open a new connection if the pool is below its limit
    fn try_grow(&self) -> Result<Option<Connection>> {
        let mut total = self.total.load(Ordering::Acquire);
        while total < self.max_size {
            match self.total.compare_exchange(
                total,
                total + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return match Connection::open(&self.endpoint, &self.timeouts, &self.credentials)
                    {
                        Ok(mut connection) if self.is_closed() => {
                            // Pool closed while the handshake ran
                            let _ = connection.close();
                            self.total.fetch_sub(1, Ordering::AcqRel);
                            self.ensure_open().map(|_| None)
                        }
                        Ok(connection) => Ok(Some(connection)),
                        Err(e) => {
                            self.total.fetch_sub(1, Ordering::AcqRel);
                            Err(e)
                        }
                    };
                }
                Err(actual) => total = actual,
            }
        }
        Ok(None)
    }

    fn open_connection(&self) -> Result<Connection> {
        self.try_grow()?.ok_or_else(|| {
            CacheError::NotConnected(format!("pool for {} is full", self.endpoint))
        })
    }

    /// Return a connection, discarding it unless it is still `Ready`
    fn release(&self, mut connection: Connection) {
        if self.is_closed() {
            let _ = connection.close();
            self.total.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        if !connection.is_ready() {
            tracing::debug!(
                "Discarding {} connection to {}",
                connection.state(),
                self.endpoint
            );
            self.total.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        if self.idle_tx.try_send(connection).is_err() {
            self.total.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Close the pool
    ///
    /// Idle connections are closed now; checked-out ones are closed as they
    /// come back. Every later `get` fails with `NotConnected`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closing connection pool for {}", self.endpoint);
        }
        self.close_idle();
    }

    /// Accept checkouts again after `close`
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Close every idle connection
    ///
    /// Checked-out connections are closed when they come back not `Ready`, or
    /// stay usable until then.
    pub fn close_idle(&self) {
        while let Ok(mut connection) = self.idle_rx.try_recv() {
            let _ = connection.close();
            self.total.fetch_sub(1, Ordering::AcqRel);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Connections currently idle in the pool
    pub fn idle_count(&self) -> usize {
        self.idle_rx.len()
    }

    /// Live connections (idle + checked out)
    pub fn total_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

/// A connection checked out of a [`ConnectionPool`]
///
/// Goes back to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Connection>,
}

impl<'a> PooledConnection<'a> {
    fn new(pool: &'a ConnectionPool, connection: Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop
        self.connection.as_ref().expect("pooled connection already released")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("pooled connection already released")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}
