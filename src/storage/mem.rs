//! In-memory storage.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Error, Result};

use super::{FileDesc, Storage, StorageLock, StorageWriter};

#[derive(Default)]
struct MemState {
    files: BTreeMap<FileDesc, Arc<Mutex<Vec<u8>>>>,
    current: Option<FileDesc>,
    locked: bool,
}

/// Storage kept entirely in memory.
///
/// Clones share the same underlying files, so a test can keep a handle
/// to inspect or damage files after handing the storage to a session.
#[derive(Clone, Default)]
pub struct MemStorage {
    state: Arc<Mutex<MemState>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write and sync fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot the contents of a file.
    pub fn file_contents(&self, fd: FileDesc) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.files.get(&fd).map(|data| data.lock().clone())
    }

    /// Replace the contents of a file, creating it if needed.
    pub fn set_file_contents(&self, fd: FileDesc, data: Vec<u8>) {
        let mut state = self.state.lock();
        state.files.insert(fd, Arc::new(Mutex::new(data)));
    }

    /// Check whether the storage lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }
}

struct MemLock {
    state: Arc<Mutex<MemState>>,
}

impl StorageLock for MemLock {}

impl Drop for MemLock {
    fn drop(&mut self) {
        self.state.lock().locked = false;
    }
}

struct MemWriter {
    data: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemWriter {
    fn check(&self) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            ));
        }
        Ok(())
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.check()?;
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.check()
    }
}

impl StorageWriter for MemWriter {
    fn sync(&mut self) -> std::io::Result<()> {
        self.check()
    }
}

impl Storage for MemStorage {
    fn lock(&self) -> Result<Box<dyn StorageLock>> {
        let mut state = self.state.lock();
        if state.locked {
            return Err(Error::LockError("storage is already locked".into()));
        }
        state.locked = true;
        Ok(Box::new(MemLock {
            state: Arc::clone(&self.state),
        }))
    }

    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(format!("injected create failure for {:?}", fd)));
        }
        let data = Arc::new(Mutex::new(Vec::new()));
        self.state.lock().files.insert(fd, Arc::clone(&data));
        Ok(Box::new(MemWriter {
            data,
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }

    fn open(&self, fd: FileDesc) -> Result<Box<dyn Read + Send>> {
        let state = self.state.lock();
        let data = state
            .files
            .get(&fd)
            .ok_or_else(|| Error::Io(format!("file not found: {:?}", fd)))?;
        let snapshot = data.lock().clone();
        Ok(Box::new(Cursor::new(snapshot)))
    }

    fn remove(&self, fd: FileDesc) -> Result<()> {
        self.state.lock().files.remove(&fd);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileDesc>> {
        Ok(self.state.lock().files.keys().copied().collect())
    }

    fn current_manifest(&self) -> Result<Option<FileDesc>> {
        let state = self.state.lock();
        Ok(state.current.filter(|fd| state.files.contains_key(fd)))
    }

    fn set_current_manifest(&self, fd: FileDesc) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io("injected failure updating CURRENT".into()));
        }
        self.state.lock().current = Some(fd);
        Ok(())
    }
}
