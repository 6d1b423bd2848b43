//! Serializer Module
//!
//! Turns structured values into bytes and back.
//!
//! ## Layers
//! - [`encode`] / [`decode`]: self-describing tagged encoding of any [`Value`],
//!   with `decode(encode(v)) == v`
//! - [`encode_item`] / [`decode_item`]: the memcached item form (flags + body),
//!   which stores primitives in the cross-client layout and falls back to the
//!   tagged encoding for everything else, and gzips large bodies

mod value;
mod encoding;
mod transcoder;

pub use value::Value;
pub use encoding::{decode, encode, MAX_DEPTH, MAX_ENCODED_SIZE};
pub use transcoder::{
    decode_item, encode_item, Item, COMPRESSION_THRESHOLD, FLAG_COMPRESSED, FLAG_SERIALIZED, SPECIAL_BOOLEAN,
    SPECIAL_BYTEARRAY, SPECIAL_DOUBLE, SPECIAL_INT, SPECIAL_LONG, SPECIAL_MASK, SPECIAL_STRING,
};
