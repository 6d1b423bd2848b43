//! Configuration for memlink
//!
//! Centralized client configuration with sensible defaults, a fluent builder,
//! and loading from the JSON files the smoke harness ships with.
//!
//! ## JSON Format
//! ```json
//! {
//!   "host": "127.0.0.1",
//!   "port": 11211,
//!   "username": "user",
//!   "password": "secret",
//!   "protocol": "binary",
//!   "opTimeoutMs": 3000
//! }
//! ```
//! `host`, `port`, `username` and `password` are required.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Default memcached port
pub const DEFAULT_PORT: u16 = 11211;

/// Default per-operation deadline (milliseconds)
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 3000;

/// Default TCP connect deadline (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

// =============================================================================
// Endpoint / Credentials
// =============================================================================

/// Address of a cache server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// SASL PLAIN credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Wire-format variant
///
/// Only the binary protocol carries SASL, so it is the only variant a
/// credentialed client can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Binary,
}

impl std::str::FromStr for Protocol {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Protocol::Binary),
            "text" => Err(CacheError::Config(
                "text protocol has no SASL support; use \"binary\"".to_string(),
            )),
            other => Err(CacheError::Config(format!("unknown protocol: {}", other))),
        }
    }
}

/// Socket deadlines used by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for establishing the TCP connection
    pub connect: Duration,

    /// Deadline for one request/response round trip
    pub op: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            op: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Main configuration for a memlink client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Server
    // -------------------------------------------------------------------------
    pub endpoint: Endpoint,

    pub protocol: Protocol,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    pub credentials: Credentials,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// Request deadline (milliseconds)
    pub op_timeout_ms: u64,

    /// TCP connect deadline (milliseconds)
    pub connect_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Connection management
    // -------------------------------------------------------------------------
    /// Number of connections; 1 means a single mutex-guarded connection
    pub pool_size: usize,
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// A builder seeded with this config, for overriding single fields
    ///
    /// `build` validates again, so overrides can't produce an invalid config.
    pub fn to_builder(&self) -> ClientConfigBuilder {
        ClientConfigBuilder {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            protocol: self.protocol,
            credentials: Some(self.credentials.clone()),
            op_timeout_ms: self.op_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            pool_size: self.pool_size,
        }
    }

    /// Parse a config from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| CacheError::Config(format!("invalid config JSON: {}", e)))?;
        raw.into_config()
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Socket deadlines derived from this config
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            op: Duration::from_millis(self.op_timeout_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(CacheError::Config("host must not be empty".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(CacheError::Config("port must be in 1..=65535".to_string()));
        }
        if self.credentials.username.is_empty() {
            return Err(CacheError::Config("username must not be empty".to_string()));
        }
        if self.op_timeout_ms == 0 {
            return Err(CacheError::Config("opTimeoutMs must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(CacheError::Config(
                "connectTimeoutMs must be positive".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(CacheError::Config("poolSize must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// On-disk shape of the config file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    op_timeout_ms: Option<u64>,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pool_size: Option<usize>,
}

impl RawConfig {
    fn into_config(self) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder()
            .host(self.host)
            .port(self.port)
            .credentials(self.username, self.password);

        if let Some(protocol) = self.protocol {
            builder = builder.protocol(protocol.parse()?);
        }
        if let Some(ms) = self.op_timeout_ms {
            builder = builder.op_timeout_ms(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.connect_timeout_ms(ms);
        }
        if let Some(size) = self.pool_size {
            builder = builder.pool_size(size);
        }

        builder.build()
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    host: String,
    port: u16,
    protocol: Protocol,
    credentials: Option<Credentials>,
    op_timeout_ms: u64,
    connect_timeout_ms: u64,
    pool_size: usize,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            protocol: Protocol::Binary,
            credentials: None,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            pool_size: 1,
        }
    }
}

impl ClientConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set host and port from an endpoint
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.host = endpoint.host;
        self.port = endpoint.port;
        self
    }

    /// Set the wire-format variant
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the SASL PLAIN credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Set the request deadline (in milliseconds)
    pub fn op_timeout_ms(mut self, ms: u64) -> Self {
        self.op_timeout_ms = ms;
        self
    }

    /// Set the connect deadline (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set the number of pooled connections
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Finish the config; fails when a required field is missing or invalid
    pub fn build(self) -> Result<ClientConfig> {
        let credentials = self
            .credentials
            .ok_or_else(|| CacheError::Config("credentials are required".to_string()))?;

        let config = ClientConfig {
            endpoint: Endpoint::new(self.host, self.port),
            protocol: self.protocol,
            credentials,
            op_timeout_ms: self.op_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            pool_size: self.pool_size,
        };
        config.validate()?;
        Ok(config)
    }
}
