//! Client
//!
//! The public cache API. Each operation serializes its value, builds one
//! request, runs one round trip and maps the response status to a typed
//! result.
//!
//! ## Concurrency
//! - `pool_size == 1`: a single connection behind a mutex, held for the whole
//!   round trip
//! - `pool_size > 1`: a [`ConnectionPool`]; each call checks out its own
//!   connection
//!
//! Failed operations are never retried here.

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::error::{CacheError, Result};
use crate::network::{Connection, ConnectionPool};
use crate::protocol::{
    build_add_request, build_append_request, build_counter_request, build_delete_request,
    build_flush_request, build_gat_request, build_get_request, build_noop_request,
    build_prepend_request, build_replace_request, build_set_request, build_touch_request,
    build_version_request, Opcode, Request, Response, Status,
};
use crate::serializer::{decode_item, encode_item, Value};

/// Expiry value that makes INCR/DECR fail on a missing key instead of seeding it
pub const COUNTER_NO_SEED: u32 = 0xffff_ffff;

enum Backend {
    Single(Mutex<Connection>),
    Pooled(ConnectionPool),
}

/// A memcached client
pub struct Client {
    config: ClientConfig,
    backend: Backend,
}

impl Client {
    /// Connect and authenticate according to `config`
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let backend = if config.pool_size > 1 {
            Backend::Pooled(ConnectionPool::new(&config)?)
        } else {
            Backend::Single(Mutex::new(Connection::open(
                &config.endpoint,
                &config.timeouts(),
                &config.credentials,
            )?))
        };

        tracing::debug!(
            "Client for {} ready ({} connection(s))",
            config.endpoint,
            config.pool_size
        );
        Ok(Self { config, backend })
    }

    /// Wrap a caller-managed connection
    ///
    /// Operations fail with `NotConnected` until the connection is `Ready`.
    pub fn with_connection(connection: Connection, config: ClientConfig) -> Self {
        Self {
            config,
            backend: Backend::Single(Mutex::new(connection)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one round trip on a connection from the backend
    fn execute(&self, request: Request) -> Result<Response> {
        match &self.backend {
            Backend::Single(connection) => connection.lock().send_and_receive(request),
            Backend::Pooled(pool) => pool.get()?.send_and_receive(request),
        }
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Store `value` under `key`; `expiry` is in seconds, 0 = never
    pub fn set(&self, key: &str, expiry: u32, value: &Value) -> Result<()> {
        let item = encode_item(value)?;
        tracing::debug!("SET {} ({} bytes, flags 0x{:04x})", key, item.data.len(), item.flags);

        let response = self.execute(build_set_request(key, item.flags, expiry, item.data)?)?;
        expect_ok(response)
    }

    /// Store only if `key` is absent; `Ok(false)` if it exists
    pub fn add(&self, key: &str, expiry: u32, value: &Value) -> Result<bool> {
        let item = encode_item(value)?;
        let response = self.execute(build_add_request(key, item.flags, expiry, item.data)?)?;
        stored(response)
    }

    /// Store only if `key` is present; `Ok(false)` if it is missing
    pub fn replace(&self, key: &str, expiry: u32, value: &Value) -> Result<bool> {
        let item = encode_item(value)?;
        let response = self.execute(build_replace_request(key, item.flags, expiry, item.data)?)?;
        stored(response)
    }

    /// Append raw bytes to an existing item; `Ok(false)` if it is missing
    pub fn append(&self, key: &str, data: &[u8]) -> Result<bool> {
        let response = self.execute(build_append_request(key, data.to_vec())?)?;
        stored(response)
    }

    /// Prepend raw bytes to an existing item; `Ok(false)` if it is missing
    pub fn prepend(&self, key: &str, data: &[u8]) -> Result<bool> {
        let response = self.execute(build_prepend_request(key, data.to_vec())?)?;
        stored(response)
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Fetch the value under `key`; `None` on a miss
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let response = self.execute(build_get_request(key)?)?;
        let value = decode_hit(response)?;
        tracing::debug!("GET {} -> {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    /// Fetch the value under `key` and reset its expiry
    pub fn get_and_touch(&self, key: &str, expiry: u32) -> Result<Option<Value>> {
        let response = self.execute(build_gat_request(key, expiry)?)?;
        decode_hit(response)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Remove `key`; `Ok(false)` if it was not present
    pub fn delete(&self, key: &str) -> Result<bool> {
        let response = self.execute(build_delete_request(key)?)?;
        found(response)
    }

    /// Reset the expiry of `key`; `Ok(false)` if it was not present
    pub fn touch(&self, key: &str, expiry: u32) -> Result<bool> {
        let response = self.execute(build_touch_request(key, expiry)?)?;
        found(response)
    }

    /// Add `delta` to a counter, seeding a missing key with `initial`
    ///
    /// Pass [`COUNTER_NO_SEED`] as `expiry` to fail on a missing key instead.
    pub fn increment(&self, key: &str, delta: u64, initial: u64, expiry: u32) -> Result<u64> {
        self.counter(Opcode::Increment, key, delta, initial, expiry)
    }

    /// Subtract `delta` from a counter (memcached clamps at 0)
    pub fn decrement(&self, key: &str, delta: u64, initial: u64, expiry: u32) -> Result<u64> {
        self.counter(Opcode::Decrement, key, delta, initial, expiry)
    }

    fn counter(&self, opcode: Opcode, key: &str, delta: u64, initial: u64, expiry: u32) -> Result<u64> {
        let response = self.execute(build_counter_request(opcode, key, delta, initial, expiry)?)?;
        if !response.is_ok() {
            return Err(status_error(response));
        }

        let bytes: [u8; 8] = response.value.as_slice().try_into().map_err(|_| {
            CacheError::Protocol(format!(
                "counter response must be 8 bytes, got {}",
                response.value.len()
            ))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    // =========================================================================
    // Server
    // =========================================================================

    /// Invalidate every item, after `expiry` seconds (0 = now)
    pub fn flush(&self, expiry: u32) -> Result<()> {
        let response = self.execute(build_flush_request(expiry))?;
        expect_ok(response)
    }

    /// Server version string
    pub fn version(&self) -> Result<String> {
        let response = self.execute(build_version_request())?;
        if !response.is_ok() {
            return Err(status_error(response));
        }
        Ok(String::from_utf8_lossy(&response.value).into_owned())
    }

    /// Round trip with no side effect
    pub fn noop(&self) -> Result<()> {
        let response = self.execute(build_noop_request())?;
        expect_ok(response)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replace the connection(s) with freshly authenticated ones
    ///
    /// The way back from a timeout: a degraded connection is never reused.
    pub fn reconnect(&self) -> Result<()> {
        match &self.backend {
            Backend::Single(connection) => {
                let mut connection = connection.lock();
                let _ = connection.close();
                *connection = Connection::open(
                    &self.config.endpoint,
                    &self.config.timeouts(),
                    &self.config.credentials,
                )?;
            }
            Backend::Pooled(pool) => {
                pool.close_idle();
                pool.reopen();
                // Open one up front so bad credentials surface here
                drop(pool.get()?);
            }
        }
        tracing::info!("Reconnected to {}", self.config.endpoint);
        Ok(())
    }

    /// Close the connection(s)
    ///
    /// Later commands fail with `NotConnected` until `reconnect`.
    pub fn close(&self) -> Result<()> {
        match &self.backend {
            Backend::Single(connection) => connection.lock().close(),
            Backend::Pooled(pool) => {
                pool.close();
                Ok(())
            }
        }
    }
}

// =============================================================================
// Status mapping
// =============================================================================

fn status_error(response: Response) -> CacheError {
    if response.status.is_auth_error() {
        CacheError::AuthRequired
    } else {
        CacheError::server(response.status, &response.value)
    }
}

fn expect_ok(response: Response) -> Result<()> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(status_error(response))
    }
}

/// Storage commands: refused-to-store is a normal outcome
fn stored(response: Response) -> Result<bool> {
    match response.status {
        Status::NoError => Ok(true),
        Status::KeyExists | Status::KeyNotFound | Status::ItemNotStored => Ok(false),
        _ => Err(status_error(response)),
    }
}

/// Key-addressed commands: a missing key is a normal outcome
fn found(response: Response) -> Result<bool> {
    match response.status {
        Status::NoError => Ok(true),
        Status::KeyNotFound => Ok(false),
        _ => Err(status_error(response)),
    }
}

fn decode_hit(response: Response) -> Result<Option<Value>> {
    match response.status {
        Status::NoError => {
            let flags = response.flags().ok_or_else(|| {
                CacheError::Protocol(format!(
                    "{:?} response carries {} extras bytes, expected flags",
                    response.opcode,
                    response.extras.len()
                ))
            })?;
            decode_item(flags, &response.value).map(Some)
        }
        Status::KeyNotFound => Ok(None),
        _ => Err(status_error(response)),
    }
}
