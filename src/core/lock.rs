//! Run-scoped exclusive lock.
//!
//! Two overlapping runs would both compute insert indices from the same
//! ledger state and interleave their blocks, so `run` holds an advisory
//! lock on `<home>/run.lock` for its whole duration.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting; errors if another run holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another run is in progress (lock held on {})",
                path.display()
            )
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_fails_fast() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");

        let held = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("Another run is in progress"));

        drop(held);
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_creates_missing_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("run.lock");

        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }
}
