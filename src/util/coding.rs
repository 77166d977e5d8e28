//! Encoding utilities for variable-length integers and length-prefixed slices.

use bytes::{Buf, BufMut, BytesMut};

/// Maximum bytes needed to encode a varint64.
pub const MAX_VARINT64_LEN: usize = 10;

/// Encode a 64-bit unsigned integer as a varint.
///
/// Returns the number of bytes written.
pub fn encode_varint64(buf: &mut BytesMut, mut value: u64) -> usize {
    let mut count = 0;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        count += 1;
    }
    buf.put_u8(value as u8);
    count + 1
}

/// Decode a 64-bit varint from a buffer.
///
/// Returns None if the buffer is too short or the varint is malformed.
pub fn decode_varint64(buf: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    for _ in 0..MAX_VARINT64_LEN {
        if buf.is_empty() {
            return None;
        }

        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }

    None
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encode a slice prefixed by its varint length.
pub fn encode_length_prefixed(buf: &mut BytesMut, data: &[u8]) {
    encode_varint64(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Decode a varint length-prefixed slice, borrowing from the input.
pub fn decode_length_prefixed<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = decode_varint64(buf)? as usize;
    if buf.len() < len {
        return None;
    }
    let (data, rest) = buf.split_at(len);
    *buf = rest;
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint64_boundaries() {
        let values = [0u64, 1, 127, 128, 16383, 16384, u64::MAX];

        for &val in &values {
            let mut buf = BytesMut::new();
            let written = encode_varint64(&mut buf, val);
            assert_eq!(written, varint_length(val));

            let mut slice: &[u8] = &buf;
            assert_eq!(decode_varint64(&mut slice), Some(val));
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_length_prefixed() {
        let mut buf = BytesMut::new();
        encode_length_prefixed(&mut buf, b"hello");
        encode_length_prefixed(&mut buf, b"");

        let mut slice: &[u8] = &buf;
        assert_eq!(decode_length_prefixed(&mut slice), Some(&b"hello"[..]));
        assert_eq!(decode_length_prefixed(&mut slice), Some(&b""[..]));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_decode_truncated() {
        let mut slice: &[u8] = &[0x80, 0x80];
        assert_eq!(decode_varint64(&mut slice), None);

        let mut buf = BytesMut::new();
        encode_varint64(&mut buf, 10);
        buf.put_slice(b"short");
        let mut slice: &[u8] = &buf;
        assert_eq!(decode_length_prefixed(&mut slice), None);
    }
}
