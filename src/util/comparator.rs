//! Key comparison utilities.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::types::InternalKey;

/// Trait for comparing user keys.
pub trait Comparator: Send + Sync {
    /// Compare two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Get the name of this comparator.
    ///
    /// The name is recorded in the manifest and must match on every reopen.
    fn name(&self) -> &str;
}

/// Default bytewise comparator (lexicographic ordering).
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl BytewiseComparator {
    /// Create a new bytewise comparator.
    pub fn new() -> Self {
        Self
    }
}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }
}

/// Compare internal keys (user_key + sequence + type).
///
/// Internal keys are compared by:
/// 1. User key in ascending order, using the user comparator
/// 2. Sequence number in descending order (newer first)
/// 3. Type in descending order
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    /// Create a new internal key comparator around a user comparator.
    pub fn new(user_comparator: Arc<dyn Comparator>) -> Self {
        Self { user_comparator }
    }

    /// Get the user comparator.
    pub fn user_comparator(&self) -> &dyn Comparator {
        self.user_comparator.as_ref()
    }

    /// Name of the wrapped user comparator.
    pub fn name(&self) -> &str {
        self.user_comparator.name()
    }

    /// Compare two user keys.
    pub fn compare_user(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user_comparator.compare(a, b)
    }

    /// Compare two decoded internal keys.
    pub fn compare(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        match self.compare_user(a.user_key(), b.user_key()) {
            Ordering::Equal => b.packed_tag().cmp(&a.packed_tag()),
            ord => ord,
        }
    }

    /// Compare two encoded internal keys.
    pub fn compare_encoded(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (user_a, tag_a) = split_encoded(a);
        let (user_b, tag_b) = split_encoded(b);

        match self.compare_user(user_a, user_b) {
            // Descending order: larger sequence number comes first
            Ordering::Equal => tag_b.cmp(&tag_a),
            ord => ord,
        }
    }
}

impl Default for InternalKeyComparator {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparator::new()))
    }
}

impl fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user_comparator", &self.name())
            .finish()
    }
}

/// Split an encoded internal key into its user key and packed tag.
///
/// Malformed keys (shorter than the tag) are treated as a bare user key with
/// tag zero so that comparison stays total.
fn split_encoded(key: &[u8]) -> (&[u8], u64) {
    if key.len() < 8 {
        return (key, 0);
    }
    let (user_key, tag) = key.split_at(key.len() - 8);
    let mut packed = [0u8; 8];
    packed.copy_from_slice(tag);
    (user_key, u64::from_be_bytes(packed))
}
