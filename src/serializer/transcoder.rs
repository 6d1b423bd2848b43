//! Item transcoding
//!
//! Maps a [`Value`] to the (flags, bytes) pair memcached stores, using the
//! flag layout common to Java and Node memcached clients so that primitive
//! values stay readable across clients:
//!
//! | Value                      | flags    | body                              |
//! |----------------------------|----------|-----------------------------------|
//! | String                     | `0x0000` | UTF-8                             |
//! | Bool                       | `0x0100` | one byte                          |
//! | Int                        | `0x0200` | i32 BE, leading zero bytes removed |
//! | Long                       | `0x0300` | i64 BE, leading zero bytes removed |
//! | Double                     | `0x0700` | f64 BE, leading zero bytes removed |
//! | Bytes                      | `0x0800` | raw                               |
//! | Null, List, Map, Record    | `0x0001` | [`encode`](super::encode) output  |
//!
//! Bodies larger than [`COMPRESSION_THRESHOLD`] are gzipped when that makes
//! them smaller, and flagged with [`FLAG_COMPRESSED`] on top of the type flag.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{decode, encode, Value, MAX_ENCODED_SIZE};
use crate::error::{CacheError, Result};

/// Body is a tagged `encode` payload
pub const FLAG_SERIALIZED: u32 = 1;

/// Body is gzip (or zlib) compressed
pub const FLAG_COMPRESSED: u32 = 2;

/// Bodies above this size are candidates for compression
pub const COMPRESSION_THRESHOLD: usize = 16384;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub const SPECIAL_MASK: u32 = 0xff00;
pub const SPECIAL_STRING: u32 = 0;
pub const SPECIAL_BOOLEAN: u32 = 1 << 8;
pub const SPECIAL_INT: u32 = 2 << 8;
pub const SPECIAL_LONG: u32 = 3 << 8;
pub const SPECIAL_DATE: u32 = 4 << 8;
pub const SPECIAL_BYTE: u32 = 5 << 8;
pub const SPECIAL_FLOAT: u32 = 6 << 8;
pub const SPECIAL_DOUBLE: u32 = 7 << 8;
pub const SPECIAL_BYTEARRAY: u32 = 8 << 8;

/// A value ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub flags: u32,
    pub data: Vec<u8>,
}

/// Convert a value to its stored form
pub fn encode_item(value: &Value) -> Result<Item> {
    let (flags, data) = match value {
        Value::String(s) => (SPECIAL_STRING, s.as_bytes().to_vec()),
        Value::Bool(b) => (SPECIAL_BOOLEAN, vec![u8::from(*b)]),
        Value::Int(i) => (SPECIAL_INT, pack(&i.to_be_bytes())),
        Value::Long(l) => (SPECIAL_LONG, pack(&l.to_be_bytes())),
        Value::Double(d) => (SPECIAL_DOUBLE, pack(&d.to_bits().to_be_bytes())),
        Value::Bytes(b) => (SPECIAL_BYTEARRAY, b.clone()),
        Value::Null | Value::List(_) | Value::Map(_) | Value::Record { .. } => {
            (FLAG_SERIALIZED, encode(value)?)
        }
    };

    if data.len() > COMPRESSION_THRESHOLD {
        let compressed = compress(&data)?;
        if compressed.len() < data.len() {
            tracing::debug!("Compressed item from {} to {} bytes", data.len(), compressed.len());
            return Ok(Item {
                flags: flags | FLAG_COMPRESSED,
                data: compressed,
            });
        }
        tracing::debug!(
            "Compression would grow item from {} to {} bytes; storing raw",
            data.len(),
            compressed.len()
        );
    }

    Ok(Item { flags, data })
}

/// Convert a stored item back to a value
pub fn decode_item(flags: u32, data: &[u8]) -> Result<Value> {
    if flags & FLAG_COMPRESSED != 0 {
        let inflated = decompress(data)?;
        return decode_body(flags & !FLAG_COMPRESSED, &inflated);
    }
    decode_body(flags, data)
}

fn decode_body(flags: u32, data: &[u8]) -> Result<Value> {
    if flags & FLAG_SERIALIZED != 0 {
        return decode(data);
    }

    match flags & SPECIAL_MASK {
        SPECIAL_STRING => String::from_utf8(data.to_vec())
            .map(Value::String)
            .map_err(|e| CacheError::MalformedPayload(format!("string is not UTF-8: {}", e))),
        SPECIAL_BOOLEAN => match data {
            [1] | [b'1'] => Ok(Value::Bool(true)),
            [0] | [b'0'] => Ok(Value::Bool(false)),
            _ => Err(CacheError::MalformedPayload(format!(
                "boolean body must be one byte, got {:?}",
                data
            ))),
        },
        SPECIAL_INT => {
            let bytes = unpack::<4>(data)?;
            Ok(Value::Int(i32::from_be_bytes(bytes)))
        }
        SPECIAL_LONG => {
            let bytes = unpack::<8>(data)?;
            Ok(Value::Long(i64::from_be_bytes(bytes)))
        }
        SPECIAL_DOUBLE => {
            let bytes = unpack::<8>(data)?;
            Ok(Value::Double(f64::from_bits(u64::from_be_bytes(bytes))))
        }
        SPECIAL_BYTEARRAY => Ok(Value::Bytes(data.to_vec())),
        // Written by other clients only; surfaced as the closest variant
        SPECIAL_DATE => {
            let bytes = unpack::<8>(data)?;
            Ok(Value::Long(i64::from_be_bytes(bytes)))
        }
        SPECIAL_BYTE => Ok(Value::Int(data.first().map_or(0, |&b| i32::from(b as i8)))),
        SPECIAL_FLOAT => {
            let bytes = unpack::<4>(data)?;
            Ok(Value::Double(f64::from(f32::from_bits(u32::from_be_bytes(bytes)))))
        }
        other => Err(CacheError::MalformedPayload(format!(
            "cannot decode item with flags 0x{:04x} (type 0x{:04x})",
            flags, other
        ))),
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a gzip or zlib body, refusing output beyond `MAX_ENCODED_SIZE`
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflated = Vec::new();
    let limit = MAX_ENCODED_SIZE + 1;
    let read = if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data).take(limit).read_to_end(&mut inflated)
    } else {
        ZlibDecoder::new(data).take(limit).read_to_end(&mut inflated)
    };
    read.map_err(|e| CacheError::MalformedPayload(format!("cannot inflate item: {}", e)))?;

    if inflated.len() as u64 > MAX_ENCODED_SIZE {
        return Err(CacheError::MalformedPayload(format!(
            "inflated item exceeds {} bytes",
            MAX_ENCODED_SIZE
        )));
    }
    Ok(inflated)
}

/// Strip leading zero bytes: `00 00 01 02` -> `01 02`
fn pack(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Left-pad with zeros back to `N` bytes: `01 02` -> `00 00 01 02`
fn unpack<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    if data.len() > N {
        return Err(CacheError::MalformedPayload(format!(
            "numeric body is {} bytes (max {})",
            data.len(),
            N
        )));
    }
    let mut bytes = [0u8; N];
    bytes[N - data.len()..].copy_from_slice(data);
    Ok(bytes)
}
