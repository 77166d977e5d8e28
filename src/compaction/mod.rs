//! Compaction planning and execution helpers.
//!
//! # LSM-Tree Compaction Strategy
//!
//! - **Level 0**: Contains files flushed from the memtable. Files may
//!   overlap. Compaction triggered when file count reaches the trigger.
//! - **Levels 1-6**: Files within a level don't overlap. Each level has a
//!   size target (exponentially increasing). Compaction triggered when
//!   level size reaches its target.
//!
//! # Compaction Process
//!
//! 1. The session picks inputs (by score, seek hint, or explicit range)
//! 2. [`Compaction`] expands them across the source and next level
//! 3. A trivial job is committed as a move record
//! 4. Otherwise the caller reads [`Compaction::new_iterator`], cutting
//!    outputs with [`Compaction::should_stop_before`]
//! 5. The caller commits deletions of the inputs plus the new outputs

mod job;
pub mod level_iterator;
pub mod merge_iterator;

pub use job::{Compaction, CompactionReason};
pub use level_iterator::LevelIterator;
pub use merge_iterator::{MergeIterator, MergeSource, VecSource};
