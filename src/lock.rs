//! Single-run lock.
//!
//! A run holds a directory at the configured lock path. Directory creation is
//! atomic, so at most one cooperating run can hold it. The lock is advisory
//! and never expires: a crashed run leaves it behind for manual removal.

use crate::error::{Result, SnapshotError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Creates the lock directory at `path`.
    ///
    /// # Errors
    /// * [`SnapshotError::AlreadyRunning`] if the directory already exists; it is left untouched.
    /// * [`SnapshotError::LockIo`] for any other failure.
    pub fn acquire(path: &Path) -> Result<Self> {
        match fs::create_dir(path) {
            Ok(()) => {
                debug!(path = %path.display(), "lock acquired");
                Ok(Self {
                    path: path.to_path_buf(),
                    released: false,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(SnapshotError::AlreadyRunning(path.to_path_buf()))
            }
            Err(source) => Err(SnapshotError::LockIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock. Calling it again is a no-op.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            release(&self.path);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Best-effort removal of a lock directory. Failures are not reported: a
/// lock that could not be removed looks the same as one never taken.
pub fn release(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        debug!(path = %path.display(), error = %e, "lock release failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");
        {
            let guard = LockGuard::acquire(&path).unwrap();
            assert!(path.is_dir());
            assert_eq!(guard.path(), path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails_and_keeps_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");
        let _guard = LockGuard::acquire(&path).unwrap();
        fs::write(path.join("owner"), b"first").unwrap();

        let err = LockGuard::acquire(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::AlreadyRunning(ref p) if *p == path));
        assert!(err.to_string().contains(&path.display().to_string()));
        assert!(path.join("owner").exists());
    }

    #[test]
    fn test_acquire_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing_parent").join("lock");
        assert!(matches!(
            LockGuard::acquire(&path),
            Err(SnapshotError::LockIo { .. })
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");
        let mut guard = LockGuard::acquire(&path).unwrap();
        guard.release();
        assert!(!path.exists());

        // Another run takes the lock; a second release must not remove it.
        let _other = LockGuard::acquire(&path).unwrap();
        guard.release();
        assert!(path.exists());
    }

    #[test]
    fn test_release_unheld_is_noop() {
        let dir = tempdir().unwrap();
        release(&dir.path().join("never_taken"));
    }
}
