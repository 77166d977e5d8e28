//! Lazy iterator over the sorted, disjoint files of one level.

use std::sync::Arc;

use bytes::Bytes;

use crate::table::{ReadOptions, TableOps};
use crate::version::FileMetadata;
use crate::Result;

use super::merge_iterator::MergeSource;

/// Walks the files of a level in order, opening each table only when the
/// previous one is exhausted.
pub struct LevelIterator {
    files: Vec<Arc<FileMetadata>>,
    tops: Arc<dyn TableOps>,
    opts: ReadOptions,
    /// Index of the file backing `current`.
    index: usize,
    current: Option<Box<dyn MergeSource + Send>>,
}

impl LevelIterator {
    /// Create an iterator over `files`, which must be sorted and disjoint.
    pub fn new(files: Vec<Arc<FileMetadata>>, tops: Arc<dyn TableOps>, opts: ReadOptions) -> Self {
        Self {
            files,
            tops,
            opts,
            index: 0,
            current: None,
        }
    }

    /// Open files starting at `index` until one yields an entry.
    fn open_from(&mut self, mut index: usize) -> Result<()> {
        self.current = None;
        while index < self.files.len() {
            let mut iter = self.tops.new_iterator(&self.files[index], &self.opts)?;
            iter.seek_to_first()?;
            if iter.valid() {
                self.index = index;
                self.current = Some(iter);
                return Ok(());
            }
            index += 1;
        }
        self.index = self.files.len();
        Ok(())
    }
}

impl MergeSource for LevelIterator {
    fn valid(&self) -> bool {
        self.current.as_ref().is_some_and(|it| it.valid())
    }

    fn key(&self) -> Option<Bytes> {
        self.current.as_ref().and_then(|it| it.key())
    }

    fn value(&self) -> Option<Bytes> {
        self.current.as_ref().and_then(|it| it.value())
    }

    fn next(&mut self) -> Result<()> {
        let exhausted = match self.current.as_mut() {
            Some(it) => {
                it.next()?;
                !it.valid()
            }
            None => return Ok(()),
        };
        if exhausted {
            self.open_from(self.index + 1)?;
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.open_from(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemTables;
    use crate::types::InternalKey;

    fn make_file(tables: &MemTables, num: u64, keys: &[&str]) -> Arc<FileMetadata> {
        let entries = keys
            .iter()
            .map(|k| (InternalKey::for_value(k.as_bytes().to_vec(), 1).encode(), Bytes::new()))
            .collect();
        tables.insert(num, entries);
        let first = keys.first().copied().unwrap_or("a");
        let last = keys.last().copied().unwrap_or("a");
        Arc::new(FileMetadata::new(
            num,
            100,
            InternalKey::for_value(first.as_bytes().to_vec(), 1),
            InternalKey::for_value(last.as_bytes().to_vec(), 1),
        ))
    }

    #[test]
    fn test_level_iterator_is_lazy() {
        let tables = Arc::new(MemTables::new());
        let files = vec![
            make_file(&tables, 1, &["a", "b"]),
            make_file(&tables, 2, &[]),
            make_file(&tables, 3, &["c"]),
        ];
        let opts = ReadOptions { fill_cache: false };
        let mut iter = LevelIterator::new(files, tables.clone(), opts);

        iter.seek_to_first().unwrap();
        // Only the first table is open.
        assert_eq!(tables.reads().len(), 1);

        let mut keys = Vec::new();
        while iter.valid() {
            let key = iter.key().unwrap();
            keys.push(InternalKey::parse_user_key(&key).unwrap().to_vec());
            iter.next().unwrap();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(tables.reads().len(), 3);
        assert!(tables.reads().iter().all(|(_, o)| !o.fill_cache));
    }
}
