//! Version management for tracking live table files.
//!
//! The version system provides:
//! - **FileMetadata**: Information about each table file
//! - **Version**: Immutable snapshot of all files organized by level
//! - **SessionRecord**: Delta/changes to apply to a Version
//! - **VersionStaging**: Folds records onto a base Version
//!
//! # LSM-Tree File Organization
//!
//! ```text
//! Level 0:  [SST-1] [SST-2] [SST-3]  (overlapping keys, insertion order)
//! Level 1:  [SST-4][SST-5][SST-6]    (non-overlapping, sorted)
//! Level 2:  [SST-7][SST-8][SST-9][SST-10]  (non-overlapping, sorted)
//! ...
//! ```

mod file_metadata;
mod record;
mod staging;
mod version;

pub use file_metadata::FileMetadata;
pub use record::SessionRecord;
pub use staging::VersionStaging;
pub use version::{SeekCompaction, Version};

pub(crate) use version::overlapping_files;

/// Field tags of an encoded session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordField {
    /// Comparer name.
    Comparer = 1,
    /// Journal file number.
    JournalNum = 2,
    /// Next file number.
    NextNum = 3,
    /// Last sequence number.
    Seq = 4,
    /// Compaction pointer for a level.
    CompactionPointer = 5,
    /// Deleted table (level, file_number).
    DeletedTable = 6,
    /// Added table (level, file_number, size, smallest, largest).
    AddedTable = 7,
    /// Previous journal number (kept for compatibility).
    PrevJournalNum = 9,
}

impl RecordField {
    /// Create from the on-disk tag.
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(RecordField::Comparer),
            2 => Some(RecordField::JournalNum),
            3 => Some(RecordField::NextNum),
            4 => Some(RecordField::Seq),
            5 => Some(RecordField::CompactionPointer),
            6 => Some(RecordField::DeletedTable),
            7 => Some(RecordField::AddedTable),
            9 => Some(RecordField::PrevJournalNum),
            _ => None,
        }
    }

    /// On-disk tag.
    pub fn tag(self) -> u64 {
        self as u64
    }

    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            RecordField::Comparer => "comparer",
            RecordField::JournalNum => "journal-num",
            RecordField::NextNum => "next-num",
            RecordField::Seq => "seq-num",
            RecordField::CompactionPointer => "compaction-ptr",
            RecordField::DeletedTable => "deleted-table",
            RecordField::AddedTable => "added-table",
            RecordField::PrevJournalNum => "prev-journal-num",
        }
    }

    pub(crate) fn bit(self) -> u32 {
        1 << (self as u32)
    }
}
