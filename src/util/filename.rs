//! Database file naming conventions.

use std::path::{Path, PathBuf};

use crate::storage::{FileDesc, FileKind};

/// Generate the lock file path.
pub fn lock_file_path(db_path: &Path) -> PathBuf {
    db_path.join("LOCK")
}

/// Generate the current file path.
pub fn current_file_path(db_path: &Path) -> PathBuf {
    db_path.join("CURRENT")
}

/// File name for a descriptor.
pub fn file_name(fd: FileDesc) -> String {
    match fd.kind {
        FileKind::Manifest => format!("MANIFEST-{:06}", fd.number),
        FileKind::Journal => format!("{:06}.log", fd.number),
        FileKind::Table => format!("{:06}.sst", fd.number),
        FileKind::Temp => format!("{:06}.tmp", fd.number),
    }
}

/// Full path of a descriptor inside the database directory.
pub fn file_path(db_path: &Path, fd: FileDesc) -> PathBuf {
    db_path.join(file_name(fd))
}

/// Parse a file name into a descriptor.
///
/// Returns `None` for names that are not numbered engine files
/// (`LOCK`, `CURRENT` and unrelated files).
pub fn parse_file_name(name: &str) -> Option<FileDesc> {
    if let Some(suffix) = name.strip_prefix("MANIFEST-") {
        return suffix.parse::<u64>().ok().map(FileDesc::manifest);
    }

    let (num_str, ext) = name.split_once('.')?;
    let number = num_str.parse::<u64>().ok()?;
    let kind = match ext {
        "log" => FileKind::Journal,
        "sst" => FileKind::Table,
        "tmp" => FileKind::Temp,
        _ => return None,
    };
    Some(FileDesc::new(kind, number))
}

/// Atomically update the CURRENT file to name `manifest`.
pub fn set_current_file(db_path: &Path, manifest: FileDesc) -> std::io::Result<()> {
    let current_path = current_file_path(db_path);
    let temp_path = file_path(db_path, FileDesc::new(FileKind::Temp, manifest.number));

    std::fs::write(&temp_path, format!("{}\n", file_name(manifest)))?;

    let file = std::fs::File::open(&temp_path)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, &current_path)?;
    sync_dir(db_path)
}

/// Read the CURRENT file, if present.
pub fn read_current_file(db_path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(current_file_path(db_path)) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// List all engine-owned files in the database directory.
pub fn list_files(db_path: &Path) -> std::io::Result<Vec<FileDesc>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(db_path)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(fd) = parse_file_name(&name.to_string_lossy()) {
            files.push(fd);
        }
    }

    files.sort();
    Ok(files)
}

/// Delete a file, ignoring "not found" errors.
pub fn delete_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Sync a directory to ensure file operations are durable.
pub fn sync_dir(path: &Path) -> std::io::Result<()> {
    let dir = std::fs::File::open(path)?;
    dir.sync_all()
}
