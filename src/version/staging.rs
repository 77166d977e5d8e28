//! Staged construction of a Version from a base plus records.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::options::{Options, MAX_LEVELS};
use crate::util::comparator::InternalKeyComparator;
use crate::{Error, Result};

use super::{FileMetadata, SessionRecord, Version};

/// Folds records onto a base version's table listing.
///
/// Each record applies its deletions first, then its additions. Level 0
/// keeps insertion order; deeper levels keep files sorted by smallest key.
///
/// A deletion naming a file the staged state does not hold is rejected
/// in strict mode and ignored otherwise.
pub struct VersionStaging {
    icmp: InternalKeyComparator,
    levels: [Vec<Arc<FileMetadata>>; MAX_LEVELS],
    strict: bool,
}

impl VersionStaging {
    /// Start staging from `base`.
    pub fn new(base: &Version, strict: bool) -> Self {
        let mut levels: [Vec<Arc<FileMetadata>>; MAX_LEVELS] = Default::default();
        for (level, files) in levels.iter_mut().enumerate() {
            *files = base.files(level).to_vec();
        }
        Self {
            icmp: base.icmp().clone(),
            levels,
            strict,
        }
    }

    /// Apply one record.
    pub fn commit(&mut self, rec: &SessionRecord) -> Result<()> {
        rec.check_levels()?;

        for &(level, number) in rec.deleted_tables() {
            let files = &mut self.levels[level];
            match files.iter().position(|f| f.number() == number) {
                Some(idx) => {
                    files.remove(idx);
                }
                None if self.strict => {
                    return Err(Error::manifest(format!(
                        "deleted-table: file {} not present at level {}",
                        number, level
                    )));
                }
                None => {
                    tracing::warn!(level, number, "ignoring deletion of unknown table");
                }
            }
        }

        for (level, file) in rec.added_tables() {
            let level = *level;
            let files = &mut self.levels[level];
            files.retain(|f| f.number() != file.number());

            let file = Arc::new(file.clone());
            if level == 0 {
                files.push(file);
            } else {
                let icmp = &self.icmp;
                let idx = files.partition_point(|f| {
                    icmp.compare(f.smallest(), file.smallest()) == Ordering::Less
                });
                files.insert(idx, file);
            }
        }

        Ok(())
    }

    /// Number of files currently staged at `level`.
    pub fn num_files(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    /// Produce the staged version with its compaction priority computed.
    pub fn finish(self, options: &Options) -> Version {
        Version::with_files(self.icmp, self.levels, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InternalKey;

    fn make_file(num: u64, smallest: &[u8], largest: &[u8]) -> FileMetadata {
        FileMetadata::new(
            num,
            1024,
            InternalKey::for_value(smallest.to_vec(), 1),
            InternalKey::for_value(largest.to_vec(), 1),
        )
    }

    fn numbers(version: &Version, level: usize) -> Vec<u64> {
        version.files(level).iter().map(|f| f.number()).collect()
    }

    fn empty() -> Version {
        Version::new(InternalKeyComparator::default())
    }

    #[test]
    fn test_staging_empty() {
        let options = Options::default();
        let version = VersionStaging::new(&empty(), true).finish(&options);
        assert_eq!(version.total_files(), 0);
    }

    #[test]
    fn test_level_ordering() {
        let options = Options::default();
        let mut rec = SessionRecord::new();
        rec.add_table(0, make_file(3, b"m", b"z"));
        rec.add_table(0, make_file(1, b"a", b"c"));
        rec.add_table(1, make_file(5, b"m", b"z"));
        rec.add_table(1, make_file(4, b"a", b"c"));
        rec.add_table(1, make_file(6, b"d", b"f"));

        let mut staging = VersionStaging::new(&empty(), true);
        staging.commit(&rec).unwrap();
        assert_eq!(staging.num_files(1), 3);
        let version = staging.finish(&options);

        // Level 0 keeps insertion order, level 1 is sorted by key.
        assert_eq!(numbers(&version, 0), vec![3, 1]);
        assert_eq!(numbers(&version, 1), vec![4, 6, 5]);
    }

    #[test]
    fn test_deletions_before_additions() {
        let options = Options::default();
        let mut first = SessionRecord::new();
        first.add_table(1, make_file(1, b"a", b"c"));
        first.add_table(1, make_file(2, b"d", b"f"));

        // Move file 2 from level 1 to level 2 in one record.
        let mut second = SessionRecord::new();
        second.add_table(2, make_file(2, b"d", b"f"));
        second.delete_table(1, 2);

        let mut staging = VersionStaging::new(&empty(), true);
        staging.commit(&first).unwrap();
        staging.commit(&second).unwrap();
        let version = staging.finish(&options);

        assert_eq!(numbers(&version, 1), vec![1]);
        assert_eq!(numbers(&version, 2), vec![2]);
    }

    #[test]
    fn test_unknown_deletion_strict() {
        let mut rec = SessionRecord::new();
        rec.delete_table(1, 42);

        let mut staging = VersionStaging::new(&empty(), true);
        let err = staging.commit(&rec).unwrap_err();
        assert!(err.is_manifest());
    }

    #[test]
    fn test_unknown_deletion_lenient() {
        let options = Options::default();
        let mut rec = SessionRecord::new();
        rec.delete_table(1, 42);
        rec.add_table(1, make_file(7, b"a", b"b"));

        let mut staging = VersionStaging::new(&empty(), false);
        staging.commit(&rec).unwrap();
        assert_eq!(numbers(&staging.finish(&options), 1), vec![7]);
    }

    #[test]
    fn test_base_is_not_modified() {
        let options = Options::default();
        let mut rec = SessionRecord::new();
        rec.add_table(1, make_file(1, b"a", b"c"));
        let base = empty().spawn(&rec, &options).unwrap();

        let mut rec = SessionRecord::new();
        rec.delete_table(1, 1);
        let next = base.spawn(&rec, &options).unwrap();

        assert_eq!(numbers(&base, 1), vec![1]);
        assert!(numbers(&next, 1).is_empty());
    }

    #[test]
    fn test_rejects_level_out_of_range() {
        let options = Options::default();
        let mut rec = SessionRecord::new();
        rec.add_table(MAX_LEVELS, make_file(7, b"a", b"b"));

        let mut staging = VersionStaging::new(&empty(), false);
        assert!(matches!(
            staging.commit(&rec),
            Err(Error::InvalidArgument(_))
        ));
        assert!(empty().spawn(&rec, &options).is_err());
    }
}
