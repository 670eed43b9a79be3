//! Inter-process directory locks.
//!
//! Two locks guard shared on-disk state:
//!
//! - **Build Lock**: the output directory, held for a whole package build
//! - **Install Lock**: a configuration's install root, held while a package
//!   is installed or uninstalled
//!
//! Both are a `naclports.lock` file in the guarded directory with a
//! non-blocking exclusive `flock`. A second process fails immediately rather
//! than waiting. The lock is released and the file removed on drop.
//!
//! # Example
//!
//! ```ignore
//! use webports_lib::lock::DirLock;
//!
//! let _guard = DirLock::acquire(&install_root)?;
//! // ... modify install root ...
//! // released when `_guard` goes out of scope
//! ```

use crate::error::LockError;
use fs2::FileExt;
use log::{debug, trace};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Lock file name placed in the guarded directory.
pub const LOCK_FILE: &str = "naclports.lock";

/// Exclusive lock on a directory.
#[derive(Debug)]
pub struct DirLock {
    /// Open handle; the flock lives as long as it does
    file: File,
    /// Path to the lock file
    path: PathBuf,
}

impl DirLock {
    /// Take the lock on `dir`, creating the directory if needed.
    ///
    /// Fails with [`LockError::Held`] when another holder exists.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        let path = dir.join(LOCK_FILE);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(io_err)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired lock {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!("lock already held: {}", path.display());
                Err(LockError::Held { path })
            }
            Err(e) => Err(io_err(e)),
        }
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = self.file.unlock();
        trace!("released lock {}", self.path.display());
    }
}

/// Lock on the output directory, held for a package build.
pub type BuildLock = DirLock;

/// Lock on a configuration's install root.
pub type InstallLock = DirLock;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock = DirLock::acquire(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join(LOCK_FILE).exists());

        drop(lock);
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn second_acquire_fails() {
        let temp_dir = TempDir::new().unwrap();
        let _held = DirLock::acquire(temp_dir.path()).unwrap();

        let err = DirLock::acquire(temp_dir.path()).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
        assert!(err.to_string().starts_with("Unable to acquire lock ("));
    }

    #[test]
    fn reacquire_after_release() {
        let temp_dir = TempDir::new().unwrap();
        drop(DirLock::acquire(temp_dir.path()).unwrap());
        assert!(DirLock::acquire(temp_dir.path()).is_ok());
    }

    #[test]
    fn creates_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b");
        let lock = DirLock::acquire(&nested).unwrap();
        assert_eq!(lock.path(), nested.join(LOCK_FILE));
    }
}
