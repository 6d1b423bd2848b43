//! Opcode definitions
//!
//! Magic bytes, command opcodes and data types of the memcached binary
//! protocol.

/// Magic byte opening every request frame
pub const MAGIC_REQUEST: u8 = 0x80;

/// Magic byte opening every response frame
pub const MAGIC_RESPONSE: u8 = 0x81;

/// The only data type the protocol defines
pub const DATA_TYPE_RAW_BYTES: u8 = 0x00;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    NoOp = 0x0a,
    Version = 0x0b,
    Append = 0x0e,
    Prepend = 0x0f,
    Touch = 0x1c,
    GetAndTouch = 0x1d,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
}

impl Opcode {
    /// Map a wire byte back to an opcode
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        let opcode = match byte {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x0a => Opcode::NoOp,
            0x0b => Opcode::Version,
            0x0e => Opcode::Append,
            0x0f => Opcode::Prepend,
            0x1c => Opcode::Touch,
            0x1d => Opcode::GetAndTouch,
            0x20 => Opcode::SaslListMechs,
            0x21 => Opcode::SaslAuth,
            _ => return None,
        };
        Some(opcode)
    }

    /// Whether the request for this opcode must carry a key
    pub fn requires_key(self) -> bool {
        !matches!(
            self,
            Opcode::Quit
                | Opcode::Flush
                | Opcode::NoOp
                | Opcode::Version
                | Opcode::SaslListMechs
        )
    }
}
