//! Per-formula advisory locks.
//!
//! One lock file per formula under `var/homebrew/locks/`. The root install
//! acquires locks for the formula and its transitive closure up front;
//! holding the open file handle holds the lock, and dropping it releases.
//! Lock files are never unlinked: removing a still-locked file would let a
//! second process create a fresh file at the same path and take a separate
//! exclusive lock.

use crate::cellar::Layout;
use crate::error::{KegError, Result};
use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};

#[derive(Debug)]
pub struct FormulaLock {
    name: String,
    _file: File,
}

impl FormulaLock {
    /// Take the exclusive lock for `name`, failing fast if another process
    /// holds it.
    pub fn acquire(layout: &Layout, name: &str) -> Result<Self> {
        let dir = layout.locks_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create lock directory: {}", dir.display()))?;

        let path = dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(KegError::Locked(name.to_string()));
        }

        Ok(FormulaLock {
            name: name.to_string(),
            _file: file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
