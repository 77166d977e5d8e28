//! Core types for strata.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

/// Value type indicator in internal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Deletion marker (tombstone).
    Deletion = 0,
    /// Normal value.
    Value = 1,
}

impl ValueType {
    /// Create from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is a deletion marker.
    pub fn is_deletion(&self) -> bool {
        matches!(self, ValueType::Deletion)
    }
}

/// Internal key format used for storage.
///
/// An internal key combines:
/// - User key (the key provided by the user)
/// - Sequence number (version for MVCC)
/// - Value type (Value or Deletion)
///
/// Encoded format:
/// ```text
/// [user_key][sequence (7 bytes)][value_type (1 byte)]
/// ```
///
/// The sequence and value_type are packed into 8 bytes with sequence
/// in the high 56 bits and value_type in the low 8 bits.
///
/// The `Ord` impl orders user keys bytewise; use
/// [`InternalKeyComparator`](crate::util::comparator::InternalKeyComparator)
/// when a custom user comparator is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    /// The user-provided key.
    user_key: Bytes,
    /// Sequence number (version).
    sequence: u64,
    /// Value type.
    value_type: ValueType,
}

impl InternalKey {
    /// Maximum sequence number (56 bits).
    pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

    /// Create a new internal key.
    pub fn new(user_key: impl Into<Bytes>, sequence: u64, value_type: ValueType) -> Self {
        debug_assert!(sequence <= Self::MAX_SEQUENCE);
        Self {
            user_key: user_key.into(),
            sequence,
            value_type,
        }
    }

    /// Create an internal key for a put operation.
    pub fn for_value(user_key: impl Into<Bytes>, sequence: u64) -> Self {
        Self::new(user_key, sequence, ValueType::Value)
    }

    /// Create an internal key for a delete operation.
    pub fn for_deletion(user_key: impl Into<Bytes>, sequence: u64) -> Self {
        Self::new(user_key, sequence, ValueType::Deletion)
    }

    /// Get the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Get the sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Check if this is a deletion marker.
    pub fn is_deletion(&self) -> bool {
        self.value_type.is_deletion()
    }

    /// Packed (sequence << 8 | type) suffix.
    pub fn packed_tag(&self) -> u64 {
        (self.sequence << 8) | (self.value_type.to_byte() as u64)
    }

    /// Encode the internal key to bytes.
    ///
    /// Format: [user_key][packed_sequence_type (8 bytes)]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf.freeze()
    }

    /// Encode into an existing buffer.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.user_key);
        buf.put_u64(self.packed_tag());
    }

    /// Decode an internal key from bytes.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        let user_key_len = data.len() - 8;
        let user_key = Bytes::copy_from_slice(&data[..user_key_len]);

        let mut packed_bytes = &data[user_key_len..];
        let packed = packed_bytes.get_u64();

        let value_type = ValueType::from_byte((packed & 0xFF) as u8)?;
        let sequence = packed >> 8;

        Some(Self {
            user_key,
            sequence,
            value_type,
        })
    }

    /// Get the encoded length.
    pub fn encoded_len(&self) -> usize {
        self.user_key.len() + 8
    }

    /// Parse the user key from encoded bytes without a full decode.
    pub fn parse_user_key(encoded: &[u8]) -> Option<&[u8]> {
        if encoded.len() < 8 {
            return None;
        }
        Some(&encoded[..encoded.len() - 8])
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.user_key.cmp(&other.user_key) {
            // Same user key: newer sequence comes first
            Ordering::Equal => other.packed_tag().cmp(&self.packed_tag()),
            ord => ord,
        }
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type() {
        assert_eq!(ValueType::from_byte(1), Some(ValueType::Value));
        assert_eq!(ValueType::from_byte(0), Some(ValueType::Deletion));
        assert_eq!(ValueType::from_byte(7), None);
        assert!(ValueType::Deletion.is_deletion());
        assert!(!ValueType::Value.is_deletion());
    }

    #[test]
    fn test_internal_key_encode_decode() {
        let key = InternalKey::new(Bytes::from("hello"), 12345, ValueType::Value);
        let encoded = key.encode();
        assert_eq!(encoded.len(), key.encoded_len());

        let decoded = InternalKey::decode(&encoded).unwrap();
        assert_eq!(key, decoded);
        assert_eq!(InternalKey::parse_user_key(&encoded), Some(&b"hello"[..]));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(InternalKey::decode(b"short").is_none());

        let mut buf = BytesMut::new();
        buf.put_slice(b"key");
        buf.put_u64((5 << 8) | 0x7F);
        assert!(InternalKey::decode(&buf).is_none());
    }

    #[test]
    fn test_internal_key_ordering() {
        let key1 = InternalKey::new(Bytes::from("aaa"), 100, ValueType::Value);
        let key2 = InternalKey::new(Bytes::from("aaa"), 200, ValueType::Value);
        let key3 = InternalKey::new(Bytes::from("bbb"), 100, ValueType::Value);

        // Same user key: higher sequence comes first
        assert!(key2 < key1);

        // Different user keys: lexicographic order
        assert!(key1 < key3);
        assert!(key2 < key3);
    }

    #[test]
    fn test_internal_key_hash() {
        use std::collections::HashSet;

        let mut keys = HashSet::new();
        keys.insert(InternalKey::for_value(Bytes::from("a"), 1));
        keys.insert(InternalKey::for_value(Bytes::from("a"), 1));
        keys.insert(InternalKey::for_deletion(Bytes::from("a"), 1));
        assert_eq!(keys.len(), 2);
    }
}
