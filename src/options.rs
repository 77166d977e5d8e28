//! Configuration options for strata.

use std::fmt;
use std::sync::Arc;

use crate::util::comparator::{BytewiseComparator, Comparator};

/// Maximum number of levels in the LSM tree.
pub const MAX_LEVELS: usize = 7;

/// Default L0 file count before compaction.
pub const DEFAULT_L0_COMPACTION_TRIGGER: usize = 4;

/// Default L1 size (10MB).
pub const DEFAULT_L1_SIZE: u64 = 10 * 1024 * 1024;

/// Default level size multiplier.
pub const DEFAULT_LEVEL_MULTIPLIER: u64 = 10;

/// Default target size of a single table file (2MB).
pub const DEFAULT_TARGET_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Manifest sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Sync on every record (safest, slowest).
    #[default]
    Always,
    /// Sync after N bytes written.
    Bytes {
        /// Number of bytes before sync.
        bytes: usize,
    },
    /// Let OS decide when to sync (fastest, may lose recent records on crash).
    None,
}

/// Session configuration options.
#[derive(Clone)]
pub struct Options {
    // === Manifest ===
    /// Abort recovery on the first corrupt manifest record, and reject
    /// records that delete tables the version does not hold.
    pub strict_manifest: bool,

    /// Manifest sync mode.
    pub sync_mode: SyncMode,

    /// User key comparator. Its name is persisted in the manifest.
    pub comparator: Arc<dyn Comparator>,

    // === Compaction ===
    /// Number of L0 files to trigger compaction.
    pub l0_compaction_trigger: usize,

    /// Target size for level 1.
    pub max_bytes_for_level_base: u64,

    /// Size multiplier for each level.
    pub max_bytes_for_level_multiplier: u64,

    /// Target size of a compaction output file.
    pub target_file_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict_manifest: true,
            sync_mode: SyncMode::default(),
            comparator: Arc::new(BytewiseComparator::new()),

            l0_compaction_trigger: DEFAULT_L0_COMPACTION_TRIGGER,
            max_bytes_for_level_base: DEFAULT_L1_SIZE,
            max_bytes_for_level_multiplier: DEFAULT_LEVEL_MULTIPLIER,
            target_file_size: DEFAULT_TARGET_FILE_SIZE,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("strict_manifest", &self.strict_manifest)
            .field("sync_mode", &self.sync_mode)
            .field("comparator", &self.comparator.name())
            .field("l0_compaction_trigger", &self.l0_compaction_trigger)
            .field("max_bytes_for_level_base", &self.max_bytes_for_level_base)
            .field(
                "max_bytes_for_level_multiplier",
                &self.max_bytes_for_level_multiplier,
            )
            .field("target_file_size", &self.target_file_size)
            .finish()
    }
}

impl Options {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        if self.l0_compaction_trigger == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "l0_compaction_trigger must be at least 1".into(),
            ));
        }

        if self.max_bytes_for_level_base == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "max_bytes_for_level_base must be non-zero".into(),
            ));
        }

        if self.max_bytes_for_level_multiplier < 2 {
            return Err(crate::Error::InvalidConfiguration(
                "max_bytes_for_level_multiplier must be at least 2".into(),
            ));
        }

        if self.target_file_size == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "target_file_size must be non-zero".into(),
            ));
        }

        Ok(())
    }

    /// Calculate the maximum size for a given level (level >= 1).
    pub fn max_bytes_for_level(&self, level: usize) -> u64 {
        let mut size = self.max_bytes_for_level_base;
        for _ in 1..level {
            size = size.saturating_mul(self.max_bytes_for_level_multiplier);
        }
        size
    }

    /// Grandparent overlap allowed for one output file before it is cut,
    /// and for a single file to still qualify as a trivial move.
    pub fn max_grandparent_overlap_bytes(&self) -> u64 {
        10 * self.target_file_size
    }

    /// Upper bound on the combined size of an expanded compaction.
    pub fn expanded_compaction_byte_limit(&self) -> u64 {
        25 * self.target_file_size
    }
}

/// Builder for Options.
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict manifest handling.
    pub fn strict_manifest(mut self, value: bool) -> Self {
        self.options.strict_manifest = value;
        self
    }

    /// Set sync mode.
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.options.sync_mode = mode;
        self
    }

    /// Set the user key comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.options.comparator = comparator;
        self
    }

    /// Set the L0 compaction trigger.
    pub fn l0_compaction_trigger(mut self, files: usize) -> Self {
        self.options.l0_compaction_trigger = files;
        self
    }

    /// Set the level 1 size target.
    pub fn max_bytes_for_level_base(mut self, bytes: u64) -> Self {
        self.options.max_bytes_for_level_base = bytes;
        self
    }

    /// Set the per-level size multiplier.
    pub fn max_bytes_for_level_multiplier(mut self, multiplier: u64) -> Self {
        self.options.max_bytes_for_level_multiplier = multiplier;
        self
    }

    /// Set the target output file size.
    pub fn target_file_size(mut self, bytes: u64) -> Self {
        self.options.target_file_size = bytes;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(opts.strict_manifest);
        assert_eq!(opts.sync_mode, SyncMode::Always);
        assert_eq!(opts.comparator.name(), "leveldb.BytewiseComparator");
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        opts.l0_compaction_trigger = 0;
        assert!(opts.validate().is_err());

        let mut opts = Options::default();
        opts.max_bytes_for_level_multiplier = 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_level_size_calculation() {
        let opts = Options::default();

        assert_eq!(opts.max_bytes_for_level(1), DEFAULT_L1_SIZE);
        assert_eq!(
            opts.max_bytes_for_level(3),
            DEFAULT_L1_SIZE * DEFAULT_LEVEL_MULTIPLIER * DEFAULT_LEVEL_MULTIPLIER
        );
    }

    #[test]
    fn test_derived_byte_limits() {
        let opts = OptionsBuilder::new().target_file_size(1000).build().unwrap();
        assert_eq!(opts.max_grandparent_overlap_bytes(), 10_000);
        assert_eq!(opts.expanded_compaction_byte_limit(), 25_000);
    }

    #[test]
    fn test_options_builder() {
        let opts = OptionsBuilder::new()
            .strict_manifest(false)
            .sync_mode(SyncMode::None)
            .l0_compaction_trigger(8)
            .build()
            .unwrap();

        assert!(!opts.strict_manifest);
        assert_eq!(opts.sync_mode, SyncMode::None);
        assert_eq!(opts.l0_compaction_trigger, 8);
    }
}
