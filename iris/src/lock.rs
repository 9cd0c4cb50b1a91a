//! Context lock
//!
//! Serializes access to the context and journal across processes. The lock
//! file carries the holder's PID and is held under an OS advisory lock, so a
//! crashed holder never leaves the store wedged: the kernel releases the
//! lock when the process dies.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::IrisError;

/// Exclusive lock over the `.context` store.
///
/// Acquire blocks until the lock is free. Dropping the guard releases the
/// advisory lock and removes the lock file (best-effort).
pub struct ContextLock {
    path: PathBuf,
    file: File,
}

impl ContextLock {
    /// Acquire the lock, blocking until it is available
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, IrisError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;

        file.lock_exclusive().map_err(|e| IrisError::Lock {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // Record the holder for diagnostics
        let _ = write!(file, "{}", std::process::id());

        debug!(path = %path.display(), "Context lock acquired");
        Ok(Self { path, file })
    }
}

impl Drop for ContextLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
        debug!(path = %self.path.display(), "Context lock released");
    }
}
