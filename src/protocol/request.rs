//! Request definitions
//!
//! Requests are immutable once built. The connection stamps the opaque token
//! through [`Request::with_opaque`], which returns a new request.

use bytes::BufMut;

use super::Opcode;
use crate::error::{CacheError, Result};

/// Maximum key length accepted by memcached
pub const MAX_KEY_LENGTH: usize = 250;

/// SASL mechanism used by the handshake
pub const SASL_MECHANISM_PLAIN: &str = "PLAIN";

/// A request frame ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    opcode: Opcode,
    key: Vec<u8>,
    extras: Vec<u8>,
    value: Vec<u8>,
    opaque: u32,
    cas: u64,
}

impl Request {
    pub(crate) fn new(opcode: Opcode, key: Vec<u8>, extras: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            opcode,
            key,
            extras,
            value,
            opaque: 0,
            cas: 0,
        }
    }

    pub(crate) fn from_parts(
        opcode: Opcode,
        key: Vec<u8>,
        extras: Vec<u8>,
        value: Vec<u8>,
        opaque: u32,
        cas: u64,
    ) -> Self {
        Self {
            opcode,
            key,
            extras,
            value,
            opaque,
            cas,
        }
    }

    /// Copy of this request carrying the given opaque token
    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    /// Copy of this request guarded by a CAS version
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn extras(&self) -> &[u8] {
        &self.extras
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn opaque(&self) -> u32 {
        self.opaque
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }

    /// Item flags for storage commands (first four extras bytes)
    pub fn flags(&self) -> Option<u32> {
        self.extras
            .get(..4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Expiry for storage commands (bytes 4..8 of the extras)
    pub fn expiry(&self) -> Option<u32> {
        match self.opcode {
            Opcode::Set | Opcode::Add | Opcode::Replace => self
                .extras
                .get(4..8)
                .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            Opcode::Touch | Opcode::GetAndTouch | Opcode::Flush => self.flags(),
            _ => None,
        }
    }
}

// =============================================================================
// Key validation
// =============================================================================

/// Check a key against memcached's limits
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key is {} bytes (max {})",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn keyed(key: &str) -> Result<Vec<u8>> {
    validate_key(key)?;
    Ok(key.as_bytes().to_vec())
}

fn flags_expiry_extras(flags: u32, expiry: u32) -> Vec<u8> {
    let mut extras = Vec::with_capacity(8);
    extras.put_u32(flags);
    extras.put_u32(expiry);
    extras
}

fn expiry_extras(expiry: u32) -> Vec<u8> {
    expiry.to_be_bytes().to_vec()
}

// =============================================================================
// Builders
// =============================================================================

/// SET: store unconditionally
pub fn build_set_request(key: &str, flags: u32, expiry: u32, payload: Vec<u8>) -> Result<Request> {
    build_storage_request(Opcode::Set, key, flags, expiry, payload)
}

/// ADD: store only if the key is absent
pub fn build_add_request(key: &str, flags: u32, expiry: u32, payload: Vec<u8>) -> Result<Request> {
    build_storage_request(Opcode::Add, key, flags, expiry, payload)
}

/// REPLACE: store only if the key is present
pub fn build_replace_request(
    key: &str,
    flags: u32,
    expiry: u32,
    payload: Vec<u8>,
) -> Result<Request> {
    build_storage_request(Opcode::Replace, key, flags, expiry, payload)
}

fn build_storage_request(
    opcode: Opcode,
    key: &str,
    flags: u32,
    expiry: u32,
    payload: Vec<u8>,
) -> Result<Request> {
    Ok(Request::new(
        opcode,
        keyed(key)?,
        flags_expiry_extras(flags, expiry),
        payload,
    ))
}

pub fn build_get_request(key: &str) -> Result<Request> {
    Ok(Request::new(Opcode::Get, keyed(key)?, Vec::new(), Vec::new()))
}

pub fn build_delete_request(key: &str) -> Result<Request> {
    Ok(Request::new(Opcode::Delete, keyed(key)?, Vec::new(), Vec::new()))
}

/// INCREMENT / DECREMENT
///
/// Extras: delta (8) + initial (8) + expiry (4). The server seeds a missing
/// key with `initial`.
pub fn build_counter_request(
    opcode: Opcode,
    key: &str,
    delta: u64,
    initial: u64,
    expiry: u32,
) -> Result<Request> {
    if !matches!(opcode, Opcode::Increment | Opcode::Decrement) {
        return Err(CacheError::Protocol(format!(
            "{:?} is not a counter opcode",
            opcode
        )));
    }

    let mut extras = Vec::with_capacity(20);
    extras.put_u64(delta);
    extras.put_u64(initial);
    extras.put_u32(expiry);

    Ok(Request::new(opcode, keyed(key)?, extras, Vec::new()))
}

pub fn build_touch_request(key: &str, expiry: u32) -> Result<Request> {
    Ok(Request::new(
        Opcode::Touch,
        keyed(key)?,
        expiry_extras(expiry),
        Vec::new(),
    ))
}

pub fn build_gat_request(key: &str, expiry: u32) -> Result<Request> {
    Ok(Request::new(
        Opcode::GetAndTouch,
        keyed(key)?,
        expiry_extras(expiry),
        Vec::new(),
    ))
}

pub fn build_append_request(key: &str, data: Vec<u8>) -> Result<Request> {
    Ok(Request::new(Opcode::Append, keyed(key)?, Vec::new(), data))
}

pub fn build_prepend_request(key: &str, data: Vec<u8>) -> Result<Request> {
    Ok(Request::new(Opcode::Prepend, keyed(key)?, Vec::new(), data))
}

/// FLUSH: invalidate every item, optionally after `expiry` seconds
pub fn build_flush_request(expiry: u32) -> Request {
    let extras = if expiry == 0 {
        Vec::new()
    } else {
        expiry_extras(expiry)
    };
    Request::new(Opcode::Flush, Vec::new(), extras, Vec::new())
}

pub fn build_version_request() -> Request {
    Request::new(Opcode::Version, Vec::new(), Vec::new(), Vec::new())
}

pub fn build_noop_request() -> Request {
    Request::new(Opcode::NoOp, Vec::new(), Vec::new(), Vec::new())
}

pub fn build_quit_request() -> Request {
    Request::new(Opcode::Quit, Vec::new(), Vec::new(), Vec::new())
}

pub fn build_sasl_list_mechs_request() -> Request {
    Request::new(Opcode::SaslListMechs, Vec::new(), Vec::new(), Vec::new())
}

/// SASL_AUTH with the PLAIN mechanism: value is `\0username\0password`
pub fn build_sasl_auth_request(username: &str, password: &str) -> Request {
    let mut value = Vec::with_capacity(2 + username.len() + password.len());
    value.put_u8(0);
    value.put_slice(username.as_bytes());
    value.put_u8(0);
    value.put_slice(password.as_bytes());

    Request::new(
        Opcode::SaslAuth,
        SASL_MECHANISM_PLAIN.as_bytes().to_vec(),
        Vec::new(),
        value,
    )
}
