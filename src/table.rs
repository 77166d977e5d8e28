//! Table collaborator consumed by compaction.
//!
//! The session never parses table files itself; it asks a [`TableOps`]
//! implementation for an iterator over a file's entries.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::compaction::merge_iterator::{MergeSource, VecSource};
use crate::version::FileMetadata;
use crate::{Error, Result};

/// Options for table reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether blocks read should be inserted into the block cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Opens iterators over table files.
pub trait TableOps: Send + Sync {
    /// Iterate the entries of `file` in internal key order.
    fn new_iterator(
        &self,
        file: &FileMetadata,
        opts: &ReadOptions,
    ) -> Result<Box<dyn MergeSource + Send>>;

    /// Release cached handles. Called once when the session closes.
    fn close(&self) {}
}

/// In-memory tables keyed by file number.
///
/// Entries are stored as given and must already be sorted by internal key.
#[derive(Default)]
pub struct MemTables {
    tables: RwLock<HashMap<u64, Vec<(Bytes, Bytes)>>>,
    reads: Mutex<Vec<(u64, ReadOptions)>>,
    closed: Mutex<bool>,
}

impl MemTables {
    /// Create an empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the entries of table `number`.
    pub fn insert(&self, number: u64, entries: Vec<(Bytes, Bytes)>) {
        self.tables.write().insert(number, entries);
    }

    /// Every iterator opened so far, as (file number, options).
    pub fn reads(&self) -> Vec<(u64, ReadOptions)> {
        self.reads.lock().clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl TableOps for MemTables {
    fn new_iterator(
        &self,
        file: &FileMetadata,
        opts: &ReadOptions,
    ) -> Result<Box<dyn MergeSource + Send>> {
        let entries = self
            .tables
            .read()
            .get(&file.number())
            .cloned()
            .ok_or_else(|| Error::Io(format!("table {} not found", file.number())))?;
        self.reads.lock().push((file.number(), *opts));
        Ok(Box::new(VecSource::new(entries)))
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InternalKey;

    #[test]
    fn test_mem_tables() {
        let tables = MemTables::new();
        let key = InternalKey::for_value(&b"k"[..], 1).encode();
        tables.insert(3, vec![(key.clone(), Bytes::from("v"))]);

        let file = FileMetadata::new(
            3,
            10,
            InternalKey::for_value(&b"k"[..], 1),
            InternalKey::for_value(&b"k"[..], 1),
        );
        let mut it = tables
            .new_iterator(&file, &ReadOptions { fill_cache: false })
            .unwrap();
        it.seek_to_first().unwrap();
        assert!(it.valid());
        assert_eq!(it.key(), Some(key));
        assert_eq!(tables.reads(), vec![(3, ReadOptions { fill_cache: false })]);

        let missing = FileMetadata::new(
            4,
            10,
            InternalKey::for_value(&b"k"[..], 1),
            InternalKey::for_value(&b"k"[..], 1),
        );
        assert!(tables.new_iterator(&missing, &ReadOptions::default()).is_err());

        tables.close();
        assert!(tables.is_closed());
    }
}
