//! Protocol Module
//!
//! The memcached binary protocol as seen from a client.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────────────────┬────────┬───────┬─────────┐
//! │       Header (24)        │ Extras │  Key  │  Value  │
//! └──────────────────────────┴────────┴───────┴─────────┘
//! ```
//!
//! ### Opcodes used by the client
//! - 0x00: GET      - key
//! - 0x01: SET      - extras (flags, expiry) + key + value
//! - 0x04: DELETE   - key
//! - 0x05/06: INCR/DECR - extras (delta, initial, expiry) + key
//! - 0x20: SASL_LIST_MECHS
//! - 0x21: SASL_AUTH - key "PLAIN" + value "\0user\0pass"
//!
//! ### Status Codes
//! - 0x0000: No error
//! - 0x0001: Key not found
//! - 0x0020: SASL auth error
//! - see [`Status`] for the rest

mod opcode;
mod request;
mod response;
mod codec;

pub use opcode::{Opcode, DATA_TYPE_RAW_BYTES, MAGIC_REQUEST, MAGIC_RESPONSE};
pub use request::{
    build_add_request, build_append_request, build_counter_request, build_delete_request,
    build_flush_request, build_gat_request, build_get_request, build_noop_request,
    build_prepend_request, build_quit_request, build_replace_request, build_sasl_auth_request,
    build_sasl_list_mechs_request, build_set_request, build_touch_request,
    build_version_request, validate_key, Request, MAX_KEY_LENGTH, SASL_MECHANISM_PLAIN,
};
pub use response::{Response, Status};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, FrameDecoder, Header, HEADER_SIZE,
    MAX_BODY_SIZE,
};
