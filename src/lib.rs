//! # memlink
//!
//! A synchronous memcached client speaking the binary protocol, with:
//! - SASL PLAIN authentication before any request
//! - Transparent serialization of strings, numbers, maps and nested records
//! - Strict request/response ordering per connection
//! - Optional bounded connection pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │              set / get / add / delete / incr ...             │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!         ┌─────────────┐               ┌──────────────┐
//!         │ Serializer  │               │   Protocol   │
//!         │ (Value ⇄ B) │               │   (frames)   │
//!         └─────────────┘               └──────┬───────┘
//!                                              │
//!                                              ▼
//!                                 ┌────────────────────────┐
//!                                 │ Connection / Pool      │
//!                                 │ (SASL, TCP, deadlines) │
//!                                 └────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use memlink::{Client, ClientConfig, Value};
//!
//! # fn main() -> memlink::Result<()> {
//! let config = ClientConfig::from_json_file("fixtures/config.json")?;
//! let client = Client::connect(config)?;
//!
//! client.set("key1", 0, &Value::from("tangyao"))?;
//! assert_eq!(client.get("key1")?, Some(Value::from("tangyao")));
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod serializer;
pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{ClientConfig, Credentials, Endpoint};
pub use serializer::Value;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of memlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
