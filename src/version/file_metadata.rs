//! File metadata for table files.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use crate::types::InternalKey;
use crate::util::comparator::InternalKeyComparator;

/// Bytes of table data paid for by one seek.
const BYTES_PER_SEEK: u64 = 16 * 1024;

/// Minimum seek budget of any file.
const MIN_ALLOWED_SEEKS: i64 = 100;

/// Metadata about a table file.
///
/// Immutable once created, except for the seek budget which is consumed by
/// concurrent readers.
#[derive(Debug)]
pub struct FileMetadata {
    /// Unique file number.
    number: u64,
    /// File size in bytes.
    size: u64,
    /// Smallest key in the file.
    smallest: InternalKey,
    /// Largest key in the file.
    largest: InternalKey,
    /// Seeks left before the file is suggested for compaction.
    allowed_seeks: AtomicI64,
}

impl FileMetadata {
    /// Create new file metadata.
    pub fn new(number: u64, size: u64, smallest: InternalKey, largest: InternalKey) -> Self {
        // Larger files get more allowed seeks before triggering compaction.
        let allowed_seeks = std::cmp::max(MIN_ALLOWED_SEEKS, (size / BYTES_PER_SEEK) as i64);

        Self {
            number,
            size,
            smallest,
            largest,
            allowed_seeks: AtomicI64::new(allowed_seeks),
        }
    }

    /// Get the file number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Get the file size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the smallest key.
    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    /// Get the largest key.
    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    /// Get allowed seeks remaining.
    pub fn allowed_seeks(&self) -> i64 {
        self.allowed_seeks.load(AtomicOrdering::Relaxed)
    }

    /// Consume one seek. Returns true exactly once, when the budget runs out.
    pub fn consume_seek(&self) -> bool {
        self.allowed_seeks.fetch_sub(1, AtomicOrdering::Relaxed) == 1
    }

    /// True if the file ends before `user_key`.
    pub fn before(&self, icmp: &InternalKeyComparator, user_key: &[u8]) -> bool {
        icmp.compare_user(self.largest.user_key(), user_key) == Ordering::Less
    }

    /// True if the file starts after `user_key`.
    pub fn after(&self, icmp: &InternalKeyComparator, user_key: &[u8]) -> bool {
        icmp.compare_user(self.smallest.user_key(), user_key) == Ordering::Greater
    }

    /// Check if the file's key range overlaps `[umin, umax]`.
    ///
    /// `None` bounds are unbounded.
    pub fn overlaps(
        &self,
        icmp: &InternalKeyComparator,
        umin: Option<&[u8]>,
        umax: Option<&[u8]>,
    ) -> bool {
        !umax.is_some_and(|k| self.after(icmp, k)) && !umin.is_some_and(|k| self.before(icmp, k))
    }

    /// Check if a user key might be in this file.
    pub fn may_contain_key(&self, icmp: &InternalKeyComparator, user_key: &[u8]) -> bool {
        !self.before(icmp, user_key) && !self.after(icmp, user_key)
    }
}

impl Clone for FileMetadata {
    fn clone(&self) -> Self {
        Self {
            number: self.number,
            size: self.size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            allowed_seeks: AtomicI64::new(self.allowed_seeks()),
        }
    }
}

impl PartialEq for FileMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.size == other.size
            && self.smallest == other.smallest
            && self.largest == other.largest
    }
}

impl Eq for FileMetadata {}
