//! Session - owns the manifest and the current Version.
//!
//! The session is responsible for:
//! - Holding the storage lock
//! - Recovering the current Version by replaying the manifest
//! - Committing records: append to the manifest, then publish
//! - Allocating file numbers and tracking the journal and sequence counters
//! - Picking compactions
//!
//! Every mutating entry point takes `&mut self`, so exactly one coordinator
//! drives the session. Readers get a [`VersionReader`] that loads the
//! current version without locking.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::compaction::{Compaction, CompactionReason};
use crate::journal::{JournalReader, JournalWriter};
use crate::options::{Options, MAX_LEVELS};
use crate::storage::{FileDesc, Storage, StorageLock};
use crate::table::TableOps;
use crate::types::InternalKey;
use crate::util::comparator::InternalKeyComparator;
use crate::version::{SessionRecord, Version, VersionStaging};
use crate::{Error, Result};

/// Lock-free handle for loading the current version from any thread.
#[derive(Clone)]
pub struct VersionReader {
    current: Arc<ArcSwap<Version>>,
}

impl VersionReader {
    /// Get the current version.
    pub fn version(&self) -> Arc<Version> {
        self.current.load_full()
    }
}

impl fmt::Debug for VersionReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionReader")
            .field("version", &*self.current.load())
            .finish()
    }
}

/// A persistent database session.
pub struct Session {
    storage: Arc<dyn Storage>,
    /// Released on close or drop.
    lock: Option<Box<dyn StorageLock>>,
    options: Arc<Options>,
    icmp: InternalKeyComparator,
    tops: Arc<dyn TableOps>,

    /// Next file number to allocate.
    next_file_number: AtomicU64,
    /// Current journal file number.
    journal_number: AtomicU64,
    /// Previous journal number, kept for compatibility.
    prev_journal_number: AtomicU64,
    /// Last sequence number.
    last_sequence: AtomicU64,

    /// Largest key of the last compaction at each level.
    compaction_pointers: [Option<InternalKey>; MAX_LEVELS],

    current: Arc<ArcSwap<Version>>,
    /// Every version published so far that may still be alive.
    published: Vec<Weak<Version>>,

    /// Open manifest; `None` until the first commit after open.
    manifest: Option<JournalWriter>,
    manifest_fd: Option<FileDesc>,
    closed: bool,
}

impl Session {
    /// Open a session on `storage`, taking its exclusive lock.
    pub fn open(
        storage: Arc<dyn Storage>,
        options: Options,
        tops: Arc<dyn TableOps>,
    ) -> Result<Self> {
        options.validate()?;
        let lock = storage.lock()?;
        let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let initial = Arc::new(Version::new(icmp.clone()));

        Ok(Self {
            storage,
            lock: Some(lock),
            options: Arc::new(options),
            icmp,
            tops,
            next_file_number: AtomicU64::new(1),
            journal_number: AtomicU64::new(0),
            prev_journal_number: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            compaction_pointers: Default::default(),
            current: Arc::new(ArcSwap::new(Arc::clone(&initial))),
            published: vec![Arc::downgrade(&initial)],
            manifest: None,
            manifest_fd: None,
            closed: false,
        })
    }

    /// Get the options.
    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    /// Get the storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Get the current version.
    pub fn version(&self) -> Arc<Version> {
        self.current.load_full()
    }

    /// Handle for concurrent readers.
    pub fn reader(&self) -> VersionReader {
        VersionReader {
            current: Arc::clone(&self.current),
        }
    }

    /// Active manifest file, if any.
    pub fn manifest_file(&self) -> Option<FileDesc> {
        self.manifest_fd
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // === Counters ===

    /// Allocate a new file number.
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the next file number without allocating it.
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }

    /// Hand back `num` if it is the most recently allocated number.
    pub fn reuse_file_number(&self, num: u64) {
        if let Some(next) = num.checked_add(1) {
            let _ = self.next_file_number.compare_exchange(
                next,
                num,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    /// Make sure `num` is never allocated.
    pub fn mark_file_number_used(&self, num: u64) {
        self.next_file_number
            .fetch_max(num.saturating_add(1), Ordering::SeqCst);
    }

    /// Get the current journal number.
    pub fn journal_number(&self) -> u64 {
        self.journal_number.load(Ordering::SeqCst)
    }

    /// Set the journal number.
    pub fn set_journal_number(&self, num: u64) {
        self.journal_number.store(num, Ordering::SeqCst);
    }

    /// Get the previous journal number.
    pub fn prev_journal_number(&self) -> u64 {
        self.prev_journal_number.load(Ordering::SeqCst)
    }

    /// Get the last sequence number.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Advance the last sequence number. Smaller values are ignored.
    pub fn set_last_sequence(&self, seq: u64) {
        self.last_sequence.fetch_max(seq, Ordering::SeqCst);
    }

    /// Compaction pointer of `level`.
    pub fn compaction_pointer(&self, level: usize) -> Option<&InternalKey> {
        self.compaction_pointers.get(level).and_then(|p| p.as_ref())
    }

    // === Manifest ===

    /// Write the initial manifest of a new database.
    pub fn create(&mut self) -> Result<()> {
        self.check_open()?;
        let version = self.version();
        self.new_manifest(None, &version)
    }

    /// Rebuild the session from the manifest.
    ///
    /// Returns `false` for a fresh database: no manifest and no other
    /// database files. A missing manifest next to existing files is an
    /// error.
    pub fn recover(&mut self) -> Result<bool> {
        self.check_open()?;

        let fd = match self.storage.current_manifest()? {
            Some(fd) => fd,
            None => {
                if self.storage.list()?.is_empty() {
                    return Ok(false);
                }
                return Err(Error::ManifestMissing);
            }
        };

        let strict = self.options.strict_manifest;
        let mut reader = JournalReader::new(self.storage.open(fd)?, strict);
        let base = Version::new(self.icmp.clone());
        let mut staging = VersionStaging::new(&base, strict);
        let mut cumulative = SessionRecord::new();
        let mut skipped = 0usize;

        loop {
            let data = match reader.next_record() {
                Ok(Some(data)) => data,
                Ok(None) => break,
                Err(e) if e.is_corruption() => return Err(Error::manifest(e.to_string())),
                Err(e) => return Err(e),
            };

            match SessionRecord::decode(&data) {
                Ok(rec) => {
                    for (level, key) in rec.compaction_pointers() {
                        self.compaction_pointers[*level] = Some(key.clone());
                    }
                    staging.commit(&rec)?;
                    cumulative.merge_scalars(&rec);
                }
                Err(e) if strict => return Err(e),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(manifest = fd.number, error = %e, "skipping manifest record");
                }
            }
        }

        let comparer = cumulative
            .comparer()
            .ok_or(Error::ManifestIncomplete("comparer name"))?;
        if comparer != self.icmp.name() {
            return Err(Error::ComparerMismatch {
                want: self.icmp.name().to_string(),
                got: comparer.to_string(),
            });
        }
        let next_num = cumulative
            .next_num()
            .ok_or(Error::ManifestIncomplete("next file number"))?;
        let journal_num = cumulative
            .journal_num()
            .ok_or(Error::ManifestIncomplete("journal file number"))?;
        let seq = cumulative
            .seq()
            .ok_or(Error::ManifestIncomplete("seq number"))?;

        let version = Arc::new(staging.finish(&self.options));
        tracing::info!(
            manifest = fd.number,
            files = version.total_files(),
            skipped,
            next_file = next_num,
            journal = journal_num,
            seq,
            "recovered session"
        );

        self.publish(version);
        self.next_file_number.store(next_num, Ordering::SeqCst);
        self.mark_file_number_used(fd.number);
        self.record_committed(&cumulative);
        self.manifest_fd = Some(fd);
        // The first commit starts a fresh manifest.
        self.manifest = None;

        Ok(true)
    }

    /// Apply `rec` to the current version and make it durable.
    ///
    /// The new version is published only after the manifest write
    /// succeeds; on error the current version is unchanged. Missing journal
    /// and sequence numbers are filled from the session, and the next file
    /// number is always set past every table the record adds.
    pub fn commit(&mut self, rec: &mut SessionRecord) -> Result<()> {
        self.check_open()?;

        if let Some(seq) = rec.seq() {
            if seq < self.last_sequence() {
                return Err(Error::internal(format!(
                    "sequence number moves backwards: {} < {}",
                    seq,
                    self.last_sequence()
                )));
            }
        }

        let candidate = Arc::new(self.version().spawn(rec, &self.options)?);
        for (_, file) in rec.added_tables() {
            self.mark_file_number_used(file.number());
        }

        if self.manifest.is_none() {
            self.new_manifest(Some(&mut *rec), &candidate)?;
        } else {
            self.fill_record(rec);
            self.flush_manifest(rec)?;
        }

        self.record_committed(rec);
        self.publish(candidate);
        Ok(())
    }

    /// Close the session: sync the manifest, release table handles and the
    /// storage lock. Calling it again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = match self.manifest.take() {
            Some(writer) => writer.close(),
            None => Ok(()),
        };
        self.tops.close();
        self.lock.take();
        tracing::info!("session closed");
        result
    }

    // === Compaction planning ===

    /// Pick the next compaction.
    ///
    /// A level whose score reached 1 takes precedence; its first file past
    /// the level's compaction pointer is picked, wrapping to the first file.
    /// Otherwise a pending seek candidate is consumed.
    pub fn pick_compaction(&mut self) -> Option<Compaction> {
        if self.closed {
            return None;
        }
        let version = self.version();

        let (level, file, reason) = if version.needs_compaction() {
            let level = version.compaction_level();
            let files = version.files(level);
            let pointer = self.compaction_pointers[level].as_ref();
            let file = files
                .iter()
                .find(|f| {
                    pointer.map_or(true, |p| {
                        self.icmp.compare(f.largest(), p) == CmpOrdering::Greater
                    })
                })
                .or_else(|| files.first())?;
            (level, Arc::clone(file), CompactionReason::Size)
        } else if let Some(hint) = version.take_seek_compaction() {
            (hint.level, Arc::clone(&hint.file), CompactionReason::Seek)
        } else {
            return None;
        };

        let compaction = Compaction::new(
            version,
            Arc::clone(&self.options),
            Arc::clone(&self.tops),
            level,
            vec![file],
            reason,
        )?;
        tracing::debug!(
            level,
            inputs = compaction.num_input_files(0),
            parents = compaction.num_input_files(1),
            reason = ?reason,
            "picked compaction"
        );
        Some(compaction)
    }

    /// Plan a compaction of every file at `level` overlapping
    /// `[umin, umax]`. `None` bounds are open.
    pub fn get_compaction_range(
        &mut self,
        level: usize,
        umin: Option<&[u8]>,
        umax: Option<&[u8]>,
    ) -> Option<Compaction> {
        if self.closed || level + 1 >= MAX_LEVELS {
            return None;
        }
        let version = self.version();
        let inputs = version.overlapping_files(level, umin, umax, level == 0);
        if inputs.is_empty() {
            return None;
        }
        Compaction::new(
            version,
            Arc::clone(&self.options),
            Arc::clone(&self.tops),
            level,
            inputs,
            CompactionReason::Manual,
        )
    }

    // === Live files ===

    /// File numbers referenced by the current version or by any version a
    /// reader or compaction still holds.
    pub fn live_files(&self) -> BTreeSet<u64> {
        let mut live = BTreeSet::new();
        for version in self.published.iter().filter_map(Weak::upgrade) {
            live.extend(version.all_files().map(|(_, f)| f.number()));
        }
        live
    }

    // === Internals ===

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn publish(&mut self, version: Arc<Version>) {
        self.published.retain(|v| v.strong_count() > 0);
        self.published.push(Arc::downgrade(&version));
        self.current.store(version);
    }

    /// Fill the counters a record must carry.
    fn fill_record(&self, rec: &mut SessionRecord) {
        if rec.journal_num().is_none() {
            rec.set_journal_num(self.journal_number());
        }
        if rec.seq().is_none() {
            rec.set_seq(self.last_sequence());
        }
        rec.set_next_num(self.next_file_number());
    }

    fn record_committed(&mut self, rec: &SessionRecord) {
        if let Some(num) = rec.journal_num() {
            self.set_journal_number(num);
        }
        if let Some(num) = rec.prev_journal_num() {
            self.prev_journal_number.store(num, Ordering::SeqCst);
        }
        if let Some(seq) = rec.seq() {
            self.set_last_sequence(seq);
        }
        for (level, key) in rec.compaction_pointers() {
            self.compaction_pointers[*level] = Some(key.clone());
        }
    }

    /// Full description of the session and `version`, merged with `rec`.
    fn snapshot_record(&self, rec: Option<&SessionRecord>, version: &Version) -> SessionRecord {
        let mut pointers = self.compaction_pointers.clone();
        let mut snapshot = SessionRecord::new();
        snapshot.set_journal_num(self.journal_number());
        snapshot.set_prev_journal_num(self.prev_journal_number());
        snapshot.set_seq(self.last_sequence());
        if let Some(rec) = rec {
            snapshot.merge_scalars(rec);
            for (level, key) in rec.compaction_pointers() {
                pointers[*level] = Some(key.clone());
            }
        }
        snapshot.set_comparer(self.icmp.name());
        snapshot.set_next_num(self.next_file_number());
        for (level, key) in pointers.iter().enumerate() {
            if let Some(key) = key {
                snapshot.add_compaction_pointer(level, key.clone());
            }
        }
        version.fill_record(&mut snapshot);
        snapshot
    }

    /// Start a new manifest holding a snapshot of `version`.
    ///
    /// On success the storage points at the new manifest and the previous
    /// one is removed. On failure the new file is removed and its number
    /// handed back.
    fn new_manifest(&mut self, rec: Option<&mut SessionRecord>, version: &Version) -> Result<()> {
        let number = self.new_file_number();
        let fd = FileDesc::manifest(number);

        let rec: Option<&SessionRecord> = match rec {
            Some(rec) => {
                self.fill_record(rec);
                Some(&*rec)
            }
            None => None,
        };
        let snapshot = self.snapshot_record(rec, version);

        let writer = match self.write_manifest(fd, &snapshot) {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(remove_err) = self.storage.remove(fd) {
                    tracing::debug!(manifest = number, error = %remove_err, "removing failed manifest");
                }
                self.reuse_file_number(number);
                return Err(e);
            }
        };

        if let Some(old) = self.manifest.replace(writer) {
            if let Err(e) = old.close() {
                tracing::warn!(error = %e, "closing previous manifest");
            }
        }
        if let Some(old) = self.manifest_fd.replace(fd) {
            if let Err(e) = self.storage.remove(old) {
                tracing::warn!(manifest = old.number, error = %e, "removing previous manifest");
            }
        }

        tracing::info!(
            manifest = number,
            files = version.total_files(),
            next_file = self.next_file_number(),
            "created manifest"
        );
        Ok(())
    }

    fn write_manifest(&self, fd: FileDesc, snapshot: &SessionRecord) -> Result<JournalWriter> {
        let file = self.storage.create(fd)?;
        let mut writer = JournalWriter::with_sync_mode(file, self.options.sync_mode);
        writer.add_record(&snapshot.encode())?;
        writer.sync()?;
        self.storage.set_current_manifest(fd)?;
        Ok(writer)
    }

    fn flush_manifest(&mut self, rec: &SessionRecord) -> Result<()> {
        let writer = self
            .manifest
            .as_mut()
            .ok_or_else(|| Error::internal("no active manifest"))?;
        writer.add_record(&rec.encode())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("manifest", &self.manifest_fd)
            .field("next_file_number", &self.next_file_number())
            .field("journal_number", &self.journal_number())
            .field("last_sequence", &self.last_sequence())
            .field("version", &self.version())
            .field("closed", &self.closed)
            .finish()
    }
}
