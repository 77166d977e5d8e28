//! Storage abstraction consumed by the session.
//!
//! The session only needs a handful of primitives from the underlying
//! storage: an exclusive lock, numbered files by kind, enumeration, and a
//! durable pointer to the active manifest.
//!
//! - **FileStorage**: directory-backed storage (`LOCK`, `CURRENT`,
//!   `MANIFEST-NNNNNN`, `NNNNNN.log`, `NNNNNN.sst`)
//! - **MemStorage**: in-memory storage with write-failure injection

mod file;
mod mem;

pub use file::FileStorage;
pub use mem::MemStorage;

use std::io::{Read, Write};

use crate::Result;

/// Kinds of files owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    /// Write-ahead journal.
    Journal,
    /// Manifest (version history).
    Manifest,
    /// Sorted table.
    Table,
    /// Temporary file.
    Temp,
}

/// Identifies a storage file by kind and number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileDesc {
    /// File kind.
    pub kind: FileKind,
    /// File number.
    pub number: u64,
}

impl FileDesc {
    /// Create a new file descriptor.
    pub fn new(kind: FileKind, number: u64) -> Self {
        Self { kind, number }
    }

    /// Descriptor of a manifest file.
    pub fn manifest(number: u64) -> Self {
        Self::new(FileKind::Manifest, number)
    }

    /// Descriptor of a table file.
    pub fn table(number: u64) -> Self {
        Self::new(FileKind::Table, number)
    }

    /// Descriptor of a journal file.
    pub fn journal(number: u64) -> Self {
        Self::new(FileKind::Journal, number)
    }
}

/// A writable storage file that can be made durable.
pub trait StorageWriter: Write + Send {
    /// Flush buffered data and sync it to stable storage.
    fn sync(&mut self) -> std::io::Result<()>;
}

/// Held exclusive storage lock. Dropping it releases the lock.
pub trait StorageLock: Send {}

/// Storage collaborator.
pub trait Storage: Send + Sync {
    /// Acquire the exclusive storage lock.
    fn lock(&self) -> Result<Box<dyn StorageLock>>;

    /// Create (or truncate) a file for writing.
    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>>;

    /// Open a file for sequential reading.
    fn open(&self, fd: FileDesc) -> Result<Box<dyn Read + Send>>;

    /// Remove a file.
    fn remove(&self, fd: FileDesc) -> Result<()>;

    /// List all engine-owned files.
    fn list(&self) -> Result<Vec<FileDesc>>;

    /// Locate the active manifest, or `None` if there is none.
    fn current_manifest(&self) -> Result<Option<FileDesc>>;

    /// Durably point the active-manifest reference at `fd`.
    fn set_current_manifest(&self, fd: FileDesc) -> Result<()>;

    /// List engine-owned files of one kind, sorted by number.
    fn list_kind(&self, kind: FileKind) -> Result<Vec<FileDesc>> {
        let mut files: Vec<FileDesc> = self
            .list()?
            .into_iter()
            .filter(|fd| fd.kind == kind)
            .collect();
        files.sort();
        Ok(files)
    }
}
