//! Tagged binary encoding of [`Value`]
//!
//! Every value is written as a 4-byte big-endian type tag followed by its
//! body. Strings, byte arrays and containers carry an 8-byte length prefix;
//! containers then encode each member the same way, recursively.
//!
//! ```text
//! Long(7)            -> [00 00 00 03][00 00 00 00 00 00 00 07]
//! String("hi")       -> [00 00 00 05][00 .. 00 02][68 69]
//! List([Int(1)])     -> [00 00 00 07][00 .. 00 01][00 00 00 02][00 00 00 01]
//! ```

use bincode::Options;
use bytes::Buf;

use super::Value;
use crate::error::{CacheError, Result};

/// Largest encoded value accepted in either direction (16 MB)
pub const MAX_ENCODED_SIZE: u64 = 16 * 1024 * 1024;

/// Deepest nesting `encode` writes and `decode` accepts
pub const MAX_DEPTH: usize = 64;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .with_limit(MAX_ENCODED_SIZE)
        .reject_trailing_bytes()
}

/// Encode a value to bytes
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let depth = value.depth();
    if depth > MAX_DEPTH {
        return Err(CacheError::MalformedPayload(format!(
            "value nested {} levels deep (max {})",
            depth, MAX_DEPTH
        )));
    }

    options()
        .serialize(value)
        .map_err(|e| CacheError::MalformedPayload(format!("cannot encode value: {}", e)))
}

/// Decode bytes produced by [`encode`]
///
/// Fails with `MalformedPayload` on an unknown tag, truncated input, trailing
/// bytes, invalid UTF-8 or nesting deeper than [`MAX_DEPTH`].
pub fn decode(bytes: &[u8]) -> Result<Value> {
    // bincode recurses once per nesting level, so depth is bounded first
    check_nesting(bytes)?;

    options()
        .deserialize(bytes)
        .map_err(|e| CacheError::MalformedPayload(e.to_string()))
}

// =============================================================================
// Nesting scan
// =============================================================================

// Variant positions of `Value`
const TAG_NULL: u32 = 0;
const TAG_BOOL: u32 = 1;
const TAG_INT: u32 = 2;
const TAG_LONG: u32 = 3;
const TAG_DOUBLE: u32 = 4;
const TAG_STRING: u32 = 5;
const TAG_BYTES: u32 = 6;
const TAG_LIST: u32 = 7;
const TAG_MAP: u32 = 8;
const TAG_RECORD: u32 = 9;

/// An open container in the scan
struct Pending {
    /// Members not yet visited
    remaining: u64,

    /// Each member is preceded by a string (map key or field name)
    named: bool,
}

/// Walk the tag/length structure without recursion and reject anything
/// nested deeper than `MAX_DEPTH`
fn check_nesting(bytes: &[u8]) -> Result<()> {
    let mut buf = bytes;
    let mut open: Vec<Pending> = Vec::new();

    loop {
        if open.len() >= MAX_DEPTH {
            return Err(CacheError::MalformedPayload(format!(
                "value nested deeper than {} levels",
                MAX_DEPTH
            )));
        }

        match take_u32(&mut buf)? {
            TAG_NULL => {}
            TAG_BOOL => skip(&mut buf, 1)?,
            TAG_INT => skip(&mut buf, 4)?,
            TAG_LONG | TAG_DOUBLE => skip(&mut buf, 8)?,
            TAG_STRING | TAG_BYTES => skip_prefixed(&mut buf)?,
            TAG_LIST => open.push(Pending {
                remaining: take_u64(&mut buf)?,
                named: false,
            }),
            TAG_MAP => open.push(Pending {
                remaining: take_u64(&mut buf)?,
                named: true,
            }),
            TAG_RECORD => {
                skip_prefixed(&mut buf)?;
                open.push(Pending {
                    remaining: take_u64(&mut buf)?,
                    named: true,
                });
            }
            tag => {
                return Err(CacheError::MalformedPayload(format!(
                    "unknown value tag {}",
                    tag
                )))
            }
        }

        // Advance to the next member, closing finished containers
        loop {
            match open.last_mut() {
                None => return Ok(()),
                Some(pending) if pending.remaining == 0 => {
                    open.pop();
                }
                Some(pending) => {
                    pending.remaining -= 1;
                    if pending.named {
                        skip_prefixed(&mut buf)?;
                    }
                    break;
                }
            }
        }
    }
}

fn truncated() -> CacheError {
    CacheError::MalformedPayload("value truncated".to_string())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(truncated());
    }
    Ok(buf.get_u64())
}

fn skip(buf: &mut &[u8], len: u64) -> Result<()> {
    match usize::try_from(len) {
        Ok(len) if len <= buf.remaining() => {
            buf.advance(len);
            Ok(())
        }
        _ => Err(truncated()),
    }
}

fn skip_prefixed(buf: &mut &[u8]) -> Result<()> {
    let len = take_u64(buf)?;
    skip(buf, len)
}
