//! Version - immutable snapshot of live table files.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::options::{Options, MAX_LEVELS};
use crate::util::comparator::InternalKeyComparator;
use crate::Result;

use super::{FileMetadata, SessionRecord, VersionStaging};

/// A file that ran out of seeks and should be compacted.
#[derive(Debug, Clone)]
pub struct SeekCompaction {
    /// Level holding the file.
    pub level: usize,
    /// The file itself.
    pub file: Arc<FileMetadata>,
}

/// An immutable snapshot of all table files at a point in time.
///
/// Versions are shared through `Arc`; a reader or compaction job holding one
/// keeps its files alive after newer versions are published.
pub struct Version {
    /// Files at each level (0 to MAX_LEVELS-1).
    /// Level 0 files may overlap; higher levels are sorted and non-overlapping.
    files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],

    /// Total file size at each level.
    level_sizes: [u64; MAX_LEVELS],

    icmp: InternalKeyComparator,

    /// Compaction score for this version.
    /// >= 1.0 means compaction is needed.
    compaction_score: f64,

    /// Level that should be compacted next.
    compaction_level: usize,

    /// Single-slot seek compaction hint, set by readers.
    seek_hint: ArcSwapOption<SeekCompaction>,
}

impl Version {
    /// Create an empty version.
    pub fn new(icmp: InternalKeyComparator) -> Self {
        Self {
            files: Default::default(),
            level_sizes: [0; MAX_LEVELS],
            icmp,
            compaction_score: 0.0,
            compaction_level: 0,
            seek_hint: ArcSwapOption::empty(),
        }
    }

    /// Create a version with the given files and compute its compaction
    /// priority.
    pub(crate) fn with_files(
        icmp: InternalKeyComparator,
        files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],
        options: &Options,
    ) -> Self {
        let mut level_sizes = [0u64; MAX_LEVELS];
        for (level, level_files) in files.iter().enumerate() {
            level_sizes[level] = level_files.iter().map(|f| f.size()).sum();
        }

        let mut version = Self {
            files,
            level_sizes,
            ..Self::new(icmp)
        };
        let (score, level) = version.compute_compaction_score(options);
        version.compaction_score = score;
        version.compaction_level = level;
        version
    }

    /// Compute the highest-priority level and its score.
    ///
    /// Level 0 is scored by file count, deeper levels by total size. The
    /// last level is never a compaction source.
    fn compute_compaction_score(&self, options: &Options) -> (f64, usize) {
        let mut best_score = -1.0;
        let mut best_level = 0;

        for level in 0..MAX_LEVELS - 1 {
            let score = if level == 0 {
                self.num_files(0) as f64 / options.l0_compaction_trigger as f64
            } else {
                self.level_size(level) as f64 / options.max_bytes_for_level(level) as f64
            };
            if score > best_score {
                best_score = score;
                best_level = level;
            }
        }

        (best_score, best_level)
    }

    /// Derive a new version by applying one record.
    pub fn spawn(&self, rec: &SessionRecord, options: &Options) -> Result<Version> {
        let mut staging = VersionStaging::new(self, options.strict_manifest);
        staging.commit(rec)?;
        Ok(staging.finish(options))
    }

    /// Internal key comparator used to order this version's files.
    pub fn icmp(&self) -> &InternalKeyComparator {
        &self.icmp
    }

    /// Get files at a specific level.
    pub fn files(&self, level: usize) -> &[Arc<FileMetadata>] {
        &self.files[level]
    }

    /// Get number of files at a level.
    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// Get total number of files across all levels.
    pub fn total_files(&self) -> usize {
        self.files.iter().map(|f| f.len()).sum()
    }

    /// Get total size at a level.
    pub fn level_size(&self, level: usize) -> u64 {
        self.level_sizes[level]
    }

    /// Get the compaction score.
    pub fn compaction_score(&self) -> f64 {
        self.compaction_score
    }

    /// Get the level that should be compacted next.
    pub fn compaction_level(&self) -> usize {
        self.compaction_level
    }

    /// Check if a size-triggered compaction is needed.
    pub fn needs_compaction(&self) -> bool {
        self.compaction_score >= 1.0
    }

    /// Get an iterator over all files at all levels.
    pub fn all_files(&self) -> impl Iterator<Item = (usize, &Arc<FileMetadata>)> {
        self.files
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.iter().map(move |f| (level, f)))
    }

    /// Find files at `level` overlapping the user key range `[umin, umax]`.
    ///
    /// With `expand_overlaps`, a matched file that widens the range restarts
    /// the scan with the wider range; used for level 0 where files overlap.
    pub fn overlapping_files(
        &self,
        level: usize,
        umin: Option<&[u8]>,
        umax: Option<&[u8]>,
        expand_overlaps: bool,
    ) -> Vec<Arc<FileMetadata>> {
        overlapping_files(&self.files[level], &self.icmp, umin, umax, expand_overlaps)
    }

    /// Charge one seek to `file`. When its budget runs out, offer it as the
    /// seek compaction candidate unless another candidate is pending.
    ///
    /// Returns true if the hint was installed.
    pub fn record_seek(&self, level: usize, file: &Arc<FileMetadata>) -> bool {
        if !file.consume_seek() {
            return false;
        }
        let hint = Arc::new(SeekCompaction {
            level,
            file: Arc::clone(file),
        });
        let prev = self
            .seek_hint
            .compare_and_swap(&None::<Arc<SeekCompaction>>, Some(hint));
        prev.is_none()
    }

    /// Pending seek compaction candidate, without consuming it.
    pub fn seek_compaction(&self) -> Option<Arc<SeekCompaction>> {
        self.seek_hint.load_full()
    }

    /// Take the seek compaction candidate. At most one caller gets it.
    pub fn take_seek_compaction(&self) -> Option<Arc<SeekCompaction>> {
        self.seek_hint.swap(None)
    }

    /// Add every file of this version to `rec`.
    pub fn fill_record(&self, rec: &mut SessionRecord) {
        for (level, file) in self.all_files() {
            rec.add_table_file(level, file);
        }
    }

    /// Get a summary of the version.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for level in 0..MAX_LEVELS {
            let num_files = self.num_files(level);
            if num_files > 0 {
                summary.push_str(&format!(
                    "L{}: {} files ({:.2} MB)\n",
                    level,
                    num_files,
                    self.level_size(level) as f64 / (1024.0 * 1024.0)
                ));
            }
        }
        summary
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = self.files.iter().map(|l| l.len()).collect();
        f.debug_struct("Version")
            .field("files", &counts)
            .field("compaction_score", &self.compaction_score)
            .field("compaction_level", &self.compaction_level)
            .finish()
    }
}

/// Collect the files of one level overlapping `[umin, umax]`.
pub(crate) fn overlapping_files<'a>(
    files: &'a [Arc<FileMetadata>],
    icmp: &InternalKeyComparator,
    mut umin: Option<&'a [u8]>,
    mut umax: Option<&'a [u8]>,
    expand_overlaps: bool,
) -> Vec<Arc<FileMetadata>> {
    let mut result = Vec::new();

    if !expand_overlaps {
        // Sorted, disjoint files: binary search for the first candidate.
        let start = match umin {
            Some(k) => files.partition_point(|f| f.before(icmp, k)),
            None => 0,
        };
        for file in &files[start..] {
            if umax.is_some_and(|k| file.after(icmp, k)) {
                break;
            }
            result.push(Arc::clone(file));
        }
        return result;
    }

    let mut i = 0;
    while i < files.len() {
        let file = &files[i];
        i += 1;
        if !file.overlaps(icmp, umin, umax) {
            continue;
        }
        if let Some(k) = umin {
            if icmp.compare_user(file.smallest().user_key(), k) == Ordering::Less {
                umin = Some(file.smallest().user_key());
                result.clear();
                i = 0;
                continue;
            }
        }
        if let Some(k) = umax {
            if icmp.compare_user(file.largest().user_key(), k) == Ordering::Greater {
                umax = Some(file.largest().user_key());
                result.clear();
                i = 0;
                continue;
            }
        }
        result.push(Arc::clone(file));
    }

    result
}
