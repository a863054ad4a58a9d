//! Single-writer guard for a data directory.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use candela_core::CandelaError;

/// Name of the lock file created inside the data directory.
pub const LOCK_FILE_NAME: &str = ".candela.lock";

/// Exclusive OS advisory lock on `<data_dir>/.candela.lock`.
///
/// Held for as long as the value lives; released on drop (or when the process exits).
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Take the lock for `data_dir` without waiting.
    ///
    /// # Errors
    /// Returns `Locked` when another holder has the lock and `Storage` when the lock
    /// file cannot be opened.
    pub fn acquire(data_dir: impl AsRef<Path>) -> Result<Self, CandelaError> {
        let path = data_dir.as_ref().join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CandelaError::storage(LOCK_FILE_NAME, e))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(CandelaError::Locked {
                    path: path.display().to_string(),
                });
            }
            Err(TryLockError::Error(e)) => return Err(CandelaError::storage(LOCK_FILE_NAME, e)),
        }

        // Informational only; the lock itself is what excludes other writers.
        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|e| CandelaError::storage(LOCK_FILE_NAME, e))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "data directory locked");
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
