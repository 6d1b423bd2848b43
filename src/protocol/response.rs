//! Response definitions
//!
//! Represents responses returned by the server.

use super::Opcode;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumeric = 0x0006,
    VbucketMismatch = 0x0007,
    AuthError = 0x0008,
    AuthContinue = 0x0009,
    SaslAuthError = 0x0020,
    SaslAuthContinue = 0x0021,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TemporaryFailure = 0x0086,
}

impl Status {
    /// Map a wire status back to a `Status`
    pub fn from_u16(code: u16) -> Option<Status> {
        let status = match code {
            0x0000 => Status::NoError,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::NonNumeric,
            0x0007 => Status::VbucketMismatch,
            0x0008 => Status::AuthError,
            0x0009 => Status::AuthContinue,
            0x0020 => Status::SaslAuthError,
            0x0021 => Status::SaslAuthContinue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TemporaryFailure,
            _ => return None,
        };
        Some(status)
    }

    /// Human-readable description, as memcached documents it
    pub fn description(self) -> &'static str {
        match self {
            Status::NoError => "No error",
            Status::KeyNotFound => "Key not found",
            Status::KeyExists => "Key exists",
            Status::ValueTooLarge => "Value too large",
            Status::InvalidArguments => "Invalid arguments",
            Status::ItemNotStored => "Item not stored",
            Status::NonNumeric => "Incr/Decr on non-numeric value",
            Status::VbucketMismatch => "The vbucket belongs to another server",
            Status::AuthError => "Authentication error",
            Status::AuthContinue => "Authentication continue",
            Status::SaslAuthError => "Auth error",
            Status::SaslAuthContinue => "Auth continue",
            Status::UnknownCommand => "Unknown command",
            Status::OutOfMemory => "Out of memory",
            Status::NotSupported => "Not supported",
            Status::InternalError => "Internal error",
            Status::Busy => "Busy",
            Status::TemporaryFailure => "Temporary failure",
        }
    }

    /// Either of the two authentication failure codes
    pub fn is_auth_error(self) -> bool {
        matches!(self, Status::AuthError | Status::SaslAuthError)
    }
}

/// A decoded response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Opcode echoed from the request
    pub opcode: Opcode,

    /// Status code
    pub status: Status,

    /// Opaque token echoed from the request
    pub opaque: u32,

    /// Item version
    pub cas: u64,

    /// Extras (item flags for GET, empty otherwise)
    pub extras: Vec<u8>,

    /// Key (only set by key-echoing commands)
    pub key: Vec<u8>,

    /// Value, or an error message when status is not `NoError`
    pub value: Vec<u8>,
}

impl Response {
    /// Create an empty response with the given status
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            opcode,
            status,
            opaque: 0,
            cas: 0,
            extras: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Create a successful response
    pub fn ok(opcode: Opcode) -> Self {
        Self::new(opcode, Status::NoError)
    }

    /// Create an error response carrying the status description as its body
    pub fn error(opcode: Opcode, status: Status) -> Self {
        Self::new(opcode, status).with_value(status.description().as_bytes().to_vec())
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_extras(mut self, extras: Vec<u8>) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = value;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::NoError
    }

    /// Item flags carried in the first four bytes of the extras
    pub fn flags(&self) -> Option<u32> {
        self.extras
            .get(..4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
