//! Directory-backed storage.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::util::filename::{
    delete_file, file_path, list_files, lock_file_path, parse_file_name, read_current_file,
    set_current_file,
};
use crate::{Error, Result};

use super::{FileDesc, FileKind, Storage, StorageLock, StorageWriter};

/// Storage rooted at a database directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Database directory path.
    db_path: PathBuf,
}

impl FileStorage {
    /// Open storage at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_path)?;
        Ok(Self { db_path })
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Lock file handle; the lock is held while the file stays open.
struct FileLock {
    _file: File,
}

impl StorageLock for FileLock {}

/// Buffered file writer.
struct FileWriter {
    writer: BufWriter<File>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for FileWriter {
    fn sync(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl Storage for FileStorage {
    fn lock(&self) -> Result<Box<dyn StorageLock>> {
        let lock_path = lock_file_path(&self.db_path);

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| {
                Error::LockError(format!(
                    "Failed to open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = lock_file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                return Err(Error::LockError(format!(
                    "{} is already locked",
                    self.db_path.display()
                )));
            }
        }

        Ok(Box::new(FileLock { _file: lock_file }))
    }

    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path(&self.db_path, fd))?;

        Ok(Box::new(FileWriter {
            writer: BufWriter::new(file),
        }))
    }

    fn open(&self, fd: FileDesc) -> Result<Box<dyn Read + Send>> {
        let file = File::open(file_path(&self.db_path, fd))?;
        Ok(Box::new(file))
    }

    fn remove(&self, fd: FileDesc) -> Result<()> {
        delete_file(&file_path(&self.db_path, fd))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileDesc>> {
        Ok(list_files(&self.db_path)?)
    }

    fn current_manifest(&self) -> Result<Option<FileDesc>> {
        let name = match read_current_file(&self.db_path)? {
            Some(name) => name,
            None => return Ok(None),
        };

        let fd = match parse_file_name(&name) {
            Some(fd) if fd.kind == FileKind::Manifest => fd,
            _ => {
                return Err(Error::corruption(format!(
                    "invalid manifest name in CURRENT: {}",
                    name
                )))
            }
        };

        if file_path(&self.db_path, fd).exists() {
            Ok(Some(fd))
        } else {
            Ok(None)
        }
    }

    fn set_current_manifest(&self, fd: FileDesc) -> Result<()> {
        set_current_file(&self.db_path, fd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let lock = storage.lock().unwrap();
        assert!(matches!(storage.lock(), Err(Error::LockError(_))));

        drop(lock);
        assert!(storage.lock().is_ok());
    }

    #[test]
    fn test_create_open_remove() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let fd = FileDesc::table(7);
        {
            let mut writer = storage.create(fd).unwrap();
            writer.write_all(b"table bytes").unwrap();
            writer.sync().unwrap();
        }

        let mut content = Vec::new();
        storage.open(fd).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"table bytes");

        assert_eq!(storage.list_kind(FileKind::Table).unwrap(), vec![fd]);
        storage.remove(fd).unwrap();
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_current_manifest() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        assert_eq!(storage.current_manifest().unwrap(), None);

        let fd = FileDesc::manifest(3);
        storage.create(fd).unwrap().sync().unwrap();
        storage.set_current_manifest(fd).unwrap();
        assert_eq!(storage.current_manifest().unwrap(), Some(fd));

        // CURRENT naming a manifest that no longer exists reads as missing.
        storage.remove(fd).unwrap();
        assert_eq!(storage.current_manifest().unwrap(), None);
    }

    #[test]
    fn test_current_manifest_garbage() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("CURRENT"), "not-a-manifest\n").unwrap();

        assert!(storage.current_manifest().unwrap_err().is_corruption());
    }
}
