//! Error types for memlink
//!
//! Provides a unified error type for all client operations.

use thiserror::Error;

use crate::protocol::Status;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for memlink operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Authentication Errors
    // -------------------------------------------------------------------------
    /// The SASL handshake was rejected or could not complete
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server refused an operation because the session is not authenticated
    #[error("Authentication required")]
    AuthRequired,

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Not connected: {0}")]
    NotConnected(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Server error ({status:?}): {message}")]
    Server { status: Status, message: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl CacheError {
    /// Build a `Server` error from a response status and its (optional) body
    pub(crate) fn server(status: Status, body: &[u8]) -> Self {
        let message = if body.is_empty() {
            status.description().to_string()
        } else {
            String::from_utf8_lossy(body).into_owned()
        };
        CacheError::Server { status, message }
    }

    /// True for errors that leave the connection unusable until it is rebuilt
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            CacheError::Io(_)
                | CacheError::Timeout(_)
                | CacheError::Protocol(_)
                | CacheError::NotConnected(_)
        )
    }
}
