//! File-based queue storage for persistent queues.

use crate::error::{StorageError, StorageResult};
use crate::storage::QueueStorage;
use fs2::FileExt;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based queue store.
///
/// The queue document lives in a single file that survives process
/// restarts. Writes go to `<name>.tmp`, are synced, then renamed over the
/// document, so a crash leaves either the old or the new queue.
///
/// # Single Writer
///
/// Opening the store takes an exclusive advisory lock on `<name>.lock`.
/// A second `FileStorage` for the same path, in this or another process,
/// fails with [`StorageError::Locked`] until the first is dropped.
///
/// # Example
///
/// ```no_run
/// use tracksync_storage::{QueueStorage, FileStorage};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("pending_ops.json")).unwrap();
/// storage.store(b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    temp_path: PathBuf,
    write_guard: Mutex<()>,
    _lock_file: File,
}

impl FileStorage {
    /// Opens file storage at `path`, creating parent directories if needed.
    ///
    /// The document itself is only created by the first `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another `FileStorage` holds the lock (returns `Locked`)
    /// - Directories or the lock file cannot be created
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_path = sibling(path, ".lock")?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path: sibling(path, ".tmp")?,
            write_guard: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the queue document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the parent directory so renames and removals are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => File::open(parent)?,
            None => File::open(".")?,
        };
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}

impl QueueStorage for FileStorage {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, data: &[u8]) -> StorageResult<()> {
        let _guard = self.write_guard.lock();

        let mut file = File::create(&self.temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_guard.lock();

        match fs::remove_file(&self.path) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> StorageResult<PathBuf> {
    let mut name: OsString = path
        .file_name()
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("queue path has no file name: {}", path.display()),
            )
        })?
        .to_os_string();
    name.push(suffix);
    Ok(path.with_file_name(name))
}
