//! A lock file preventing two concurrent sanitizer runs over the same
//! output tree.

use bridgedesc_error::Error;
use fslock::LockFile;
use std::path::{Path, PathBuf};

/// A held exclusive lock on a run-lock file.
///
/// The concurrency model is single-threaded, cooperative, one job run at a
/// time: a second concurrent run over the same output tree is not supported
/// and must be prevented externally. This type is that external guard; it
/// releases the lock when dropped.
pub struct RunLock {
    /// The underlying OS-level lock file.
    file: LockFile,
    /// Where the lock file lives, kept for diagnostics.
    path: PathBuf,
}

impl RunLock {
    /// Try to acquire the run lock at `path`, creating the file if needed.
    ///
    /// Returns `Ok(None)` if another run already holds the lock.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = LockFile::open(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let acquired = file.try_lock().map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        if acquired {
            Ok(Some(RunLock { file, path }))
        } else {
            Ok(None)
        }
    }

    /// Path to the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        let second = RunLock::try_acquire(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = RunLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }
}
