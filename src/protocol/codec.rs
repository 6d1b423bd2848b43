//! Protocol codec
//!
//! Encoding and decoding functions for binary protocol frames.
//!
//! ## Wire Format
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!    /              |               |               |               |
//!   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
//!   +---------------+---------------+---------------+---------------+
//!  0| Magic         | Opcode        | Key length                    |
//!   +---------------+---------------+---------------+---------------+
//!  4| Extras length | Data type     | vbucket id / Status           |
//!   +---------------+---------------+---------------+---------------+
//!  8| Total body length                                             |
//!   +---------------+---------------+---------------+---------------+
//! 12| Opaque                                                        |
//!   +---------------+---------------+---------------+---------------+
//! 16| CAS                                                           |
//!   |                                                               |
//!   +---------------+---------------+---------------+---------------+
//! 24| Extras, Key, Value (total body length bytes)                  |
//! ```
//!
//! Total body length = extras length + key length + value length.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use super::opcode::{DATA_TYPE_RAW_BYTES, MAGIC_REQUEST, MAGIC_RESPONSE};
use super::{Opcode, Request, Response, Status};
use crate::error::{CacheError, Result};

/// Fixed header size of every frame
pub const HEADER_SIZE: usize = 24;

/// Maximum body size accepted from the wire (16 MB)
pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    /// vbucket id for requests, status for responses
    pub vbucket_or_status: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    /// Parse and validate a header for the given magic
    ///
    /// `bytes` must hold at least `HEADER_SIZE` bytes.
    pub fn parse(bytes: &[u8], expected_magic: u8) -> Result<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(CacheError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let header = Header {
            magic: buf.get_u8(),
            opcode: buf.get_u8(),
            key_length: buf.get_u16(),
            extras_length: buf.get_u8(),
            data_type: buf.get_u8(),
            vbucket_or_status: buf.get_u16(),
            total_body_length: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        };

        if header.magic != expected_magic {
            return Err(CacheError::Protocol(format!(
                "Bad magic: expected 0x{:02x}, got 0x{:02x}",
                expected_magic, header.magic
            )));
        }

        if header.total_body_length > MAX_BODY_SIZE {
            return Err(CacheError::Protocol(format!(
                "Body too large: {} bytes (max {})",
                header.total_body_length, MAX_BODY_SIZE
            )));
        }

        let fixed = header.extras_length as u32 + header.key_length as u32;
        if fixed > header.total_body_length {
            return Err(CacheError::Protocol(format!(
                "Inconsistent lengths: extras {} + key {} exceed body {}",
                header.extras_length, header.key_length, header.total_body_length
            )));
        }

        Ok(header)
    }

    /// Size of the whole frame (header + body)
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.total_body_length as usize
    }

    fn value_len(&self) -> usize {
        self.total_body_length as usize - self.extras_length as usize - self.key_length as usize
    }
}

/// Split a validated frame body into (extras, key, value)
fn split_body(header: &Header, bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let total = header.frame_len();
    if bytes.len() < total {
        return Err(CacheError::Protocol(format!(
            "Incomplete body: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }
    if bytes.len() > total {
        return Err(CacheError::Protocol(format!(
            "Trailing bytes after frame: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let mut body = &bytes[HEADER_SIZE..total];
    let extras = body[..header.extras_length as usize].to_vec();
    body.advance(header.extras_length as usize);
    let key = body[..header.key_length as usize].to_vec();
    body.advance(header.key_length as usize);
    let value = body[..header.value_len()].to_vec();

    Ok((extras, key, value))
}

#[allow(clippy::too_many_arguments)]
fn put_frame(
    message: &mut Vec<u8>,
    magic: u8,
    opcode: Opcode,
    vbucket_or_status: u16,
    opaque: u32,
    cas: u64,
    extras: &[u8],
    key: &[u8],
    value: &[u8],
) {
    let body_len = extras.len() + key.len() + value.len();
    message.reserve(HEADER_SIZE + body_len);

    message.put_u8(magic);
    message.put_u8(opcode as u8);
    message.put_u16(key.len() as u16);
    message.put_u8(extras.len() as u8);
    message.put_u8(DATA_TYPE_RAW_BYTES);
    message.put_u16(vbucket_or_status);
    message.put_u32(body_len as u32);
    message.put_u32(opaque);
    message.put_u64(cas);
    message.put_slice(extras);
    message.put_slice(key);
    message.put_slice(value);
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut message = Vec::new();
    put_frame(
        &mut message,
        MAGIC_REQUEST,
        request.opcode(),
        0,
        request.opaque(),
        request.cas(),
        request.extras(),
        request.key(),
        request.value(),
    );
    message
}

/// Decode a request from exactly one frame
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let header = Header::parse(bytes, MAGIC_REQUEST)?;
    let opcode = Opcode::from_u8(header.opcode).ok_or_else(|| {
        CacheError::Protocol(format!("Unknown opcode: 0x{:02x}", header.opcode))
    })?;
    let (extras, key, value) = split_body(&header, bytes)?;

    Ok(Request::from_parts(
        opcode,
        key,
        extras,
        value,
        header.opaque,
        header.cas,
    ))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut message = Vec::new();
    put_frame(
        &mut message,
        MAGIC_RESPONSE,
        response.opcode,
        response.status as u16,
        response.opaque,
        response.cas,
        &response.extras,
        &response.key,
        &response.value,
    );
    message
}

/// Decode a response from exactly one frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let header = Header::parse(bytes, MAGIC_RESPONSE)?;

    let opcode = Opcode::from_u8(header.opcode).ok_or_else(|| {
        CacheError::Protocol(format!("Unknown opcode: 0x{:02x}", header.opcode))
    })?;
    let status = Status::from_u16(header.vbucket_or_status).ok_or_else(|| {
        CacheError::Protocol(format!(
            "Unknown response status: 0x{:04x}",
            header.vbucket_or_status
        ))
    })?;
    let (extras, key, value) = split_body(&header, bytes)?;

    Ok(Response {
        opcode,
        status,
        opaque: header.opaque,
        cas: header.cas,
        extras,
        key,
        value,
    })
}

// =============================================================================
// Incremental reassembly
// =============================================================================

/// Reassembles response frames from arbitrarily split reads
///
/// Bytes are appended with [`FrameDecoder::extend`]; [`FrameDecoder::decode_next`]
/// yields frames in arrival order once the length prefix says they are whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete response, if one is buffered
    pub fn decode_next(&mut self) -> Result<Option<Response>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Header::parse(&self.buffer, MAGIC_RESPONSE)?;
        if self.buffer.len() < header.frame_len() {
            return Ok(None);
        }

        let frame = self.buffer.split_to(header.frame_len());
        decode_response(&frame).map(Some)
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + body) from a stream
fn read_frame<R: Read>(reader: &mut R, magic: u8) -> Result<Vec<u8>> {
    let mut frame = vec![0u8; HEADER_SIZE];
    reader.read_exact(&mut frame)?;

    let header = Header::parse(&frame, magic)?;
    frame.resize(header.frame_len(), 0);
    if header.total_body_length > 0 {
        reader.read_exact(&mut frame[HEADER_SIZE..])?;
    }

    Ok(frame)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&encode_request(request))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete request from a stream
///
/// Blocks until a complete request is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let frame = read_frame(reader, MAGIC_REQUEST)?;
    decode_request(&frame)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let frame = read_frame(reader, MAGIC_RESPONSE)?;
    decode_response(&frame)
}
