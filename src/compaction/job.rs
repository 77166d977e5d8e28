//! A single compaction: inputs from two adjacent levels plus the
//! grandparent overlap bookkeeping used while writing output.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::options::{Options, MAX_LEVELS};
use crate::table::{ReadOptions, TableOps};
use crate::types::InternalKey;
use crate::util::comparator::InternalKeyComparator;
use crate::version::{overlapping_files, FileMetadata, SessionRecord, Version};
use crate::Result;

use super::level_iterator::LevelIterator;
use super::merge_iterator::{MergeIterator, MergeSource};

/// Why a compaction was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionReason {
    /// The level exceeded its size or file-count target.
    Size,
    /// A file ran out of allowed seeks.
    Seek,
    /// An explicit key range was requested.
    Manual,
}

/// A compaction to be executed.
///
/// Holds the version it was planned against, which keeps every input file
/// alive until the job is dropped.
pub struct Compaction {
    version: Arc<Version>,
    options: Arc<Options>,
    tops: Arc<dyn TableOps>,
    reason: CompactionReason,

    /// Source level.
    level: usize,
    /// Inputs at `level` and `level + 1`.
    inputs: [Vec<Arc<FileMetadata>>; 2],
    /// Files at `level + 2` overlapping the compaction range.
    grandparents: Vec<Arc<FileMetadata>>,
    /// Key range of the level inputs.
    imin: InternalKey,
    imax: InternalKey,
    expanded: bool,

    // Output state.
    gp_index: usize,
    seen_key: bool,
    gp_overlapped_bytes: u64,
    level_ptrs: [usize; MAX_LEVELS],
}

impl Compaction {
    /// Plan a compaction of `inputs` at `level` and expand it.
    ///
    /// Returns `None` if `inputs` is empty or `level` has no next level.
    pub(crate) fn new(
        version: Arc<Version>,
        options: Arc<Options>,
        tops: Arc<dyn TableOps>,
        level: usize,
        inputs: Vec<Arc<FileMetadata>>,
        reason: CompactionReason,
    ) -> Option<Self> {
        if level + 1 >= MAX_LEVELS {
            return None;
        }
        let (imin, imax) = key_range(version.icmp(), &inputs)?;

        let mut compaction = Self {
            version,
            options,
            tops,
            reason,
            level,
            inputs: [inputs, Vec::new()],
            grandparents: Vec::new(),
            imin,
            imax,
            expanded: false,
            gp_index: 0,
            seen_key: false,
            gp_overlapped_bytes: 0,
            level_ptrs: [0; MAX_LEVELS],
        };
        compaction.expand();
        Some(compaction)
    }

    /// Complete the input set across both levels.
    ///
    /// Gathers the overlapping `level + 1` files, then tries once to grow the
    /// `level` inputs to the combined range without pulling in more
    /// `level + 1` files, as long as the total stays under the expansion
    /// byte limit. Finally collects the grandparent files. Runs only once.
    pub fn expand(&mut self) {
        if self.expanded {
            return;
        }
        self.expanded = true;

        let icmp = self.version.icmp().clone();
        let vt0 = self.version.files(self.level);
        let vt1 = self.version.files(self.level + 1);
        let limit = self.options.expanded_compaction_byte_limit();

        let mut t0 = std::mem::take(&mut self.inputs[0]);
        let (mut imin, mut imax) = (self.imin.clone(), self.imax.clone());

        if self.level == 0 {
            // Level 0 files overlap each other; take every file the range
            // touches, transitively.
            let grown = overlapping_files(
                vt0,
                &icmp,
                Some(imin.user_key()),
                Some(imax.user_key()),
                true,
            );
            if grown.len() != t0.len() {
                if let Some(range) = key_range(&icmp, &grown) {
                    (imin, imax) = range;
                }
            }
            t0 = grown;
        }

        let mut t1 = overlapping_files(
            vt1,
            &icmp,
            Some(imin.user_key()),
            Some(imax.user_key()),
            false,
        );
        let (mut amin, mut amax) = combined_range(&icmp, &t0, &t1, (&imin, &imax));

        if !t1.is_empty() {
            let exp0 = overlapping_files(
                vt0,
                &icmp,
                Some(amin.user_key()),
                Some(amax.user_key()),
                self.level == 0,
            );
            if exp0.len() > t0.len() && total_size(&t1) + total_size(&exp0) < limit {
                if let Some((xmin, xmax)) = key_range(&icmp, &exp0) {
                    let exp1 = overlapping_files(
                        vt1,
                        &icmp,
                        Some(xmin.user_key()),
                        Some(xmax.user_key()),
                        false,
                    );
                    if exp1.len() == t1.len() {
                        tracing::debug!(
                            level = self.level,
                            from_files = t0.len(),
                            from_bytes = total_size(&t0),
                            to_files = exp0.len(),
                            to_bytes = total_size(&exp0),
                            parent_files = t1.len(),
                            "expanding compaction inputs"
                        );
                        imin = xmin;
                        imax = xmax;
                        t0 = exp0;
                        t1 = exp1;
                        (amin, amax) = combined_range(&icmp, &t0, &t1, (&imin, &imax));
                    }
                }
            }
        }

        if self.level + 2 < MAX_LEVELS {
            self.grandparents = overlapping_files(
                self.version.files(self.level + 2),
                &icmp,
                Some(amin.user_key()),
                Some(amax.user_key()),
                false,
            );
        }

        self.inputs = [t0, t1];
        self.imin = imin;
        self.imax = imax;
    }

    /// Whether the job can move its single input file to the next level
    /// without rewriting it.
    pub fn trivial(&self) -> bool {
        self.inputs[0].len() == 1
            && self.inputs[1].is_empty()
            && total_size(&self.grandparents) <= self.options.max_grandparent_overlap_bytes()
    }

    /// Whether no file below the output level can hold `user_key`.
    ///
    /// Keys must be passed in increasing order; the per-level cursors never
    /// move backwards.
    pub fn is_base_level_for_key(&mut self, user_key: &[u8]) -> bool {
        let icmp = self.version.icmp();
        for level in self.level + 2..MAX_LEVELS {
            let files = self.version.files(level);
            while self.level_ptrs[level] < files.len() {
                let file = &files[self.level_ptrs[level]];
                if icmp.compare_user(user_key, file.largest().user_key()) != Ordering::Greater {
                    // We've advanced far enough.
                    if icmp.compare_user(user_key, file.smallest().user_key()) != Ordering::Less
                    {
                        return false;
                    }
                    break;
                }
                self.level_ptrs[level] += 1;
            }
        }
        true
    }

    /// Whether the current output file should be finished before `key`.
    ///
    /// Grandparent files entirely before `key` are charged to the current
    /// output once the first key has been seen. When the charge exceeds the
    /// overlap limit it is reset and true is returned.
    pub fn should_stop_before(&mut self, key: &InternalKey) -> bool {
        let icmp = self.version.icmp();
        while self.gp_index < self.grandparents.len() {
            let gp = &self.grandparents[self.gp_index];
            if icmp.compare(key, gp.largest()) != Ordering::Greater {
                break;
            }
            if self.seen_key {
                self.gp_overlapped_bytes += gp.size();
            }
            self.gp_index += 1;
        }
        self.seen_key = true;

        if self.gp_overlapped_bytes > self.options.max_grandparent_overlap_bytes() {
            self.gp_overlapped_bytes = 0;
            return true;
        }
        false
    }

    /// Open a single iterator over every input file in internal key order.
    ///
    /// Level 0 inputs get one iterator each; other levels are read lazily
    /// file by file. Reads do not fill the block cache.
    pub fn new_iterator(&self) -> Result<MergeIterator> {
        let opts = ReadOptions { fill_cache: false };
        let mut sources: Vec<Box<dyn MergeSource + Send>> = Vec::new();

        for (which, files) in self.inputs.iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            if self.level + which == 0 {
                for file in files {
                    sources.push(self.tops.new_iterator(file, &opts)?);
                }
            } else {
                sources.push(Box::new(LevelIterator::new(
                    files.clone(),
                    Arc::clone(&self.tops),
                    opts,
                )));
            }
        }

        Ok(MergeIterator::new(sources, self.version.icmp().clone()))
    }

    /// Record the deletion of every input file.
    pub fn add_input_deletions(&self, rec: &mut SessionRecord) {
        for (which, files) in self.inputs.iter().enumerate() {
            for file in files {
                rec.delete_table(self.level + which, file.number());
            }
        }
    }

    /// Build the record that moves the single input one level down.
    ///
    /// Returns `None` unless the job is trivial.
    pub fn trivial_move_record(&self) -> Option<SessionRecord> {
        if !self.trivial() {
            return None;
        }
        let file = &self.inputs[0][0];
        let mut rec = SessionRecord::new();
        rec.add_compaction_pointer(self.level, self.imax.clone());
        rec.delete_table(self.level, file.number());
        rec.add_table_file(self.level + 1, file);
        Some(rec)
    }

    /// Key to persist as the level's compaction pointer once this job
    /// commits.
    pub fn compaction_pointer(&self) -> &InternalKey {
        &self.imax
    }

    /// Source level.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Level outputs are written to.
    pub fn output_level(&self) -> usize {
        self.level + 1
    }

    /// Why the job was picked.
    pub fn reason(&self) -> CompactionReason {
        self.reason
    }

    /// Inputs at `level + which`, `which` being 0 or 1.
    pub fn inputs(&self, which: usize) -> &[Arc<FileMetadata>] {
        &self.inputs[which]
    }

    /// Number of input files at `level + which`.
    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs[which].len()
    }

    /// Grandparent files overlapping the compaction.
    pub fn grandparents(&self) -> &[Arc<FileMetadata>] {
        &self.grandparents
    }

    /// Total size of all inputs in bytes.
    pub fn total_input_size(&self) -> u64 {
        total_size(&self.inputs[0]) + total_size(&self.inputs[1])
    }

    /// Key range of the level inputs.
    pub fn key_range(&self) -> (&InternalKey, &InternalKey) {
        (&self.imin, &self.imax)
    }

    /// Version the job was planned against.
    pub fn version(&self) -> &Arc<Version> {
        &self.version
    }
}

impl fmt::Debug for Compaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers =
            |files: &[Arc<FileMetadata>]| files.iter().map(|f| f.number()).collect::<Vec<_>>();
        f.debug_struct("Compaction")
            .field("level", &self.level)
            .field("reason", &self.reason)
            .field("inputs0", &numbers(&self.inputs[0]))
            .field("inputs1", &numbers(&self.inputs[1]))
            .field("grandparents", &numbers(&self.grandparents))
            .finish()
    }
}

fn total_size(files: &[Arc<FileMetadata>]) -> u64 {
    files.iter().map(|f| f.size()).sum()
}

/// Smallest and largest internal keys over `files`.
fn key_range(
    icmp: &InternalKeyComparator,
    files: &[Arc<FileMetadata>],
) -> Option<(InternalKey, InternalKey)> {
    let first = files.first()?;
    let mut imin = first.smallest();
    let mut imax = first.largest();
    for file in &files[1..] {
        if icmp.compare(file.smallest(), imin) == Ordering::Less {
            imin = file.smallest();
        }
        if icmp.compare(file.largest(), imax) == Ordering::Greater {
            imax = file.largest();
        }
    }
    Some((imin.clone(), imax.clone()))
}

/// Range covered by both input sets, falling back to `fallback` when empty.
fn combined_range(
    icmp: &InternalKeyComparator,
    t0: &[Arc<FileMetadata>],
    t1: &[Arc<FileMetadata>],
    fallback: (&InternalKey, &InternalKey),
) -> (InternalKey, InternalKey) {
    let all: Vec<Arc<FileMetadata>> = t0.iter().chain(t1).cloned().collect();
    key_range(icmp, &all).unwrap_or_else(|| (fallback.0.clone(), fallback.1.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemTables;
    use bytes::Bytes;

    fn ikey(user_key: &str, seq: u64) -> InternalKey {
        InternalKey::for_value(user_key.as_bytes().to_vec(), seq)
    }

    fn file(num: u64, size: u64, smallest: &str, largest: &str) -> FileMetadata {
        FileMetadata::new(num, size, ikey(smallest, 1), ikey(largest, 1))
    }

    fn options(target_file_size: u64) -> Arc<Options> {
        Arc::new(Options {
            target_file_size,
            ..Options::default()
        })
    }

    fn build(options: &Options, files: Vec<(usize, FileMetadata)>) -> Arc<Version> {
        let mut rec = SessionRecord::new();
        for (level, f) in files {
            rec.add_table(level, f);
        }
        Arc::new(
            Version::new(InternalKeyComparator::default())
                .spawn(&rec, options)
                .unwrap(),
        )
    }

    fn compaction(
        options: Arc<Options>,
        version: Arc<Version>,
        level: usize,
        picks: &[u64],
    ) -> Compaction {
        let inputs = version
            .files(level)
            .iter()
            .filter(|f| picks.contains(&f.number()))
            .cloned()
            .collect();
        Compaction::new(
            version,
            options,
            Arc::new(MemTables::new()),
            level,
            inputs,
            CompactionReason::Manual,
        )
        .unwrap()
    }

    fn numbers(files: &[Arc<FileMetadata>]) -> Vec<u64> {
        let mut n: Vec<u64> = files.iter().map(|f| f.number()).collect();
        n.sort();
        n
    }

    #[test]
    fn test_empty_inputs_and_last_level() {
        let opts = options(100);
        let version = build(&opts, vec![(6, file(1, 10, "a", "b"))]);
        let inputs = version.files(6).to_vec();
        assert!(Compaction::new(
            version.clone(),
            opts.clone(),
            Arc::new(MemTables::new()),
            6,
            inputs,
            CompactionReason::Manual
        )
        .is_none());
        assert!(Compaction::new(
            version,
            opts,
            Arc::new(MemTables::new()),
            1,
            Vec::new(),
            CompactionReason::Manual
        )
        .is_none());
    }

    #[test]
    fn test_expand_collects_parents_and_grandparents() {
        let opts = options(100);
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "c", "f")),
                (2, file(2, 10, "a", "d")),
                (2, file(3, 10, "e", "g")),
                (2, file(4, 10, "x", "z")),
                (3, file(5, 10, "a", "b")),
                (3, file(6, 10, "h", "i")),
                (3, file(7, 10, "y", "z")),
            ],
        );
        let c = compaction(opts, version, 1, &[1]);

        assert_eq!(numbers(c.inputs(0)), vec![1]);
        assert_eq!(numbers(c.inputs(1)), vec![2, 3]);
        // Combined range is [a, g].
        assert_eq!(numbers(c.grandparents()), vec![5]);
        assert_eq!(c.total_input_size(), 30);
        assert!(!c.trivial());
    }

    #[test]
    fn test_expand_grows_level_inputs() {
        let opts = options(100);
        // Parent [a,h] covers both level-1 files.
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "b", "c")),
                (1, file(2, 10, "e", "f")),
                (2, file(3, 10, "a", "h")),
            ],
        );
        let c = compaction(opts, version, 1, &[1]);
        assert_eq!(numbers(c.inputs(0)), vec![1, 2]);
        assert_eq!(numbers(c.inputs(1)), vec![3]);
        assert_eq!(c.compaction_pointer().user_key(), b"f");
    }

    #[test]
    fn test_expand_respects_byte_limit() {
        // Limit is 25 * 10 = 250 bytes.
        let opts = options(10);
        let version = build(
            &opts,
            vec![
                (1, file(1, 100, "b", "c")),
                (1, file(2, 100, "e", "f")),
                (2, file(3, 100, "a", "h")),
            ],
        );
        let c = compaction(opts, version, 1, &[1]);
        assert_eq!(numbers(c.inputs(0)), vec![1]);
    }

    #[test]
    fn test_expand_keeps_parent_set() {
        let opts = options(100);
        // Growing to file 2 would pull in parent 4 as well.
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "b", "c")),
                (1, file(2, 10, "e", "k")),
                (2, file(3, 10, "a", "f")),
                (2, file(4, 10, "j", "m")),
            ],
        );
        let c = compaction(opts, version, 1, &[1]);
        assert_eq!(numbers(c.inputs(0)), vec![1]);
        assert_eq!(numbers(c.inputs(1)), vec![3]);
    }

    #[test]
    fn test_level0_inputs_expand_transitively() {
        let opts = options(100);
        let version = build(
            &opts,
            vec![
                (0, file(1, 10, "a", "c")),
                (0, file(2, 10, "b", "f")),
                (0, file(3, 10, "e", "h")),
                (0, file(4, 10, "x", "z")),
            ],
        );
        let c = compaction(opts, version, 0, &[1]);
        assert_eq!(numbers(c.inputs(0)), vec![1, 2, 3]);
        assert_eq!(c.key_range().1.user_key(), b"h");
    }

    #[test]
    fn test_trivial() {
        // Ceiling: 10 * 100 = 1000 bytes of grandparents.
        let opts = options(100);
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "c", "d")),
                (3, file(2, 1000, "a", "z")),
            ],
        );
        let c = compaction(opts.clone(), version, 1, &[1]);
        assert!(c.trivial());
        let rec = c.trivial_move_record().unwrap();
        assert!(rec.deleted_tables().contains(&(1, 1)));
        assert_eq!(rec.added_tables()[0].0, 2);
        assert_eq!(rec.compaction_pointers()[0].0, 1);

        // Grandparent overlap above the ceiling.
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "c", "d")),
                (3, file(2, 1001, "a", "z")),
            ],
        );
        let c = compaction(opts.clone(), version, 1, &[1]);
        assert!(!c.trivial());
        assert!(c.trivial_move_record().is_none());

        // A parent file.
        let version = build(
            &opts,
            vec![(1, file(1, 10, "c", "d")), (2, file(2, 10, "d", "e"))],
        );
        assert!(!compaction(opts.clone(), version, 1, &[1]).trivial());

        // Two level inputs.
        let version = build(
            &opts,
            vec![(1, file(1, 10, "c", "d")), (1, file(2, 10, "e", "f"))],
        );
        assert!(!compaction(opts, version, 1, &[1, 2]).trivial());
    }

    #[test]
    fn test_is_base_level_for_key() {
        let opts = options(100);
        let version = build(
            &opts,
            vec![
                (0, file(1, 10, "a", "z")),
                (2, file(2, 10, "c", "e")),
                (4, file(3, 10, "m", "p")),
            ],
        );
        let mut c = compaction(opts, version, 0, &[1]);

        assert!(c.is_base_level_for_key(b"a"));
        assert!(!c.is_base_level_for_key(b"c"));
        assert!(!c.is_base_level_for_key(b"e"));
        assert!(c.is_base_level_for_key(b"f"));
        assert!(!c.is_base_level_for_key(b"n"));
        assert!(c.is_base_level_for_key(b"q"));
    }

    #[test]
    fn test_should_stop_before() {
        // Ceiling: 10 * 10 = 100 bytes.
        let opts = options(10);
        let version = build(
            &opts,
            vec![
                (1, file(1, 10, "a", "z")),
                (3, file(2, 60, "b", "c")),
                (3, file(3, 60, "d", "e")),
                (3, file(4, 60, "f", "g")),
                (3, file(5, 60, "h", "i")),
            ],
        );
        let mut c = compaction(opts, version, 1, &[1]);
        assert_eq!(c.grandparents().len(), 4);

        // Grandparents passed before the first key are not charged.
        assert!(!c.should_stop_before(&ikey("d", 9)));
        // Passing [d,e] charges 60.
        assert!(!c.should_stop_before(&ikey("f", 9)));
        // Passing [f,g] brings the total to 120: cut.
        assert!(c.should_stop_before(&ikey("h", 9)));
        // Counter was reset.
        assert!(!c.should_stop_before(&ikey("h", 8)));
        assert!(!c.should_stop_before(&ikey("x", 9)));
    }

    #[test]
    fn test_new_iterator_merges_inputs() {
        let opts = options(100);
        let tables = Arc::new(MemTables::new());
        let put = |num: u64, keys: &[(&str, u64)]| {
            let entries = keys
                .iter()
                .map(|(k, s)| (ikey(k, *s).encode(), Bytes::from(format!("{}{}", k, s))))
                .collect();
            tables.insert(num, entries);
        };
        put(1, &[("a", 9), ("d", 9)]);
        put(2, &[("b", 8), ("d", 8)]);
        put(3, &[("a", 2), ("b", 2)]);
        put(4, &[("c", 2), ("e", 2)]);

        let version = build(
            &opts,
            vec![
                (0, file(1, 10, "a", "d")),
                (0, file(2, 10, "b", "d")),
                (1, file(3, 10, "a", "b")),
                (1, file(4, 10, "c", "e")),
            ],
        );
        let inputs = version.files(0).to_vec();
        let c = Compaction::new(
            version,
            opts,
            tables.clone(),
            0,
            inputs,
            CompactionReason::Size,
        )
        .unwrap();

        let mut iter = c.new_iterator().unwrap();
        // Two level-0 tables plus one level iterator.
        assert_eq!(iter.num_sources(), 3);

        iter.seek_to_first().unwrap();
        let mut seen = Vec::new();
        while iter.valid() {
            let key = InternalKey::decode(&iter.key().unwrap()).unwrap();
            seen.push(format!(
                "{}{}",
                String::from_utf8_lossy(key.user_key()),
                key.sequence()
            ));
            iter.next().unwrap();
        }
        assert_eq!(seen, vec!["a9", "a2", "b8", "b2", "c2", "d9", "d8", "e2"]);
        assert!(tables.reads().iter().all(|(_, o)| !o.fill_cache));
    }

    #[test]
    fn test_add_input_deletions() {
        let opts = options(100);
        let version = build(
            &opts,
            vec![(1, file(1, 10, "a", "c")), (2, file(2, 10, "b", "d"))],
        );
        let c = compaction(opts, version, 1, &[1]);
        let mut rec = SessionRecord::new();
        c.add_input_deletions(&mut rec);
        assert_eq!(
            rec.deleted_tables().iter().copied().collect::<Vec<_>>(),
            vec![(1, 1), (2, 2)]
        );
    }
}
