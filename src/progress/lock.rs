//! Advisory lock over a progress directory
//!
//! Two pulls writing the same chunk files would break the one-writer-per-file
//! rule, so a pull holds an exclusive fd-lock on `pull.lock` for its whole run.
//! Readers (status, monitor) never take it.

use super::ProgressError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the progress directory
pub const LOCK_FILE_NAME: &str = "pull.lock";

/// Job lock wrapper
pub struct JobLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl JobLock {
    /// Open (creating if needed) the lock file in `dir`
    pub fn open(dir: &Path) -> Result<Self, ProgressError> {
        std::fs::create_dir_all(dir).map_err(|e| ProgressError::Io(e.to_string()))?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ProgressError::Lock(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the exclusive lock without blocking.
    ///
    /// The lock is held until the returned guard is dropped.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, ProgressError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ProgressError::Lock(format!(
                "{path} is held by another pull ({e})"
            ))
        })
    }
}
