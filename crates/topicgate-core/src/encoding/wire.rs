//! Confluent Schema Registry wire framing.
//!
//! ```text
//! +------+----------------+--------------------+
//! | 0x00 | schema id (BE) | schema-encoded ... |
//! +------+----------------+--------------------+
//!   1B         4B               N bytes
//! ```
//!
//! Registry-aware consumers rely on this layout byte for byte.

use bytes::{BufMut, Bytes, BytesMut};

/// Serialization format version; currently always 0.
pub const MAGIC_BYTE: u8 = 0;

/// Magic byte plus the 4-byte schema id.
pub const HEADER_LEN: usize = 5;

/// Prefix `payload` with the magic byte and the big-endian schema id.
pub fn frame(schema_id: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(MAGIC_BYTE);
    buf.put_u32(schema_id);
    buf.extend_from_slice(payload);
    buf.freeze()
}
