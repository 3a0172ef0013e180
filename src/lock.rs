//! Per-file serialization and crash-safe snapshots
//!
//! Concurrent callers working the same file must not interleave reads and
//! restores. [`LockArena`] hands out one mutex per canonical path, created
//! lazily and shared across clones of the arena. [`FileBackup`] snapshots a
//! file's bytes up front and restores them on drop unless explicitly
//! disarmed, so a panic or early return between read and restore leaves the
//! file byte-identical to its original state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Lazily-populated map of one lock per file path
#[derive(Clone, Default)]
pub struct LockArena {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl LockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `path`; the same path always yields the same mutex
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Snapshot of a file's contents, restored on drop unless disarmed
pub struct FileBackup {
    path: PathBuf,
    contents: String,
    armed: bool,
}

impl FileBackup {
    pub fn take(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            armed: true,
        })
    }

    /// The bytes as they were at snapshot time
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Write the snapshot back immediately
    pub fn restore(&self) -> Result<()> {
        fs::write(&self.path, &self.contents)?;
        Ok(())
    }

    /// Keep whatever is on disk now; drop will not restore
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FileBackup {
    fn drop(&mut self) {
        if self.armed {
            // Last line of defense; the error has nowhere to go
            let _ = fs::write(&self.path, &self.contents);
        }
    }
}
