//! Run lock
//!
//! Two bootstrap runs against the same manifest would interleave writes to
//! the state file and the shared workspaces, so each run holds an exclusive
//! advisory lock on `<state file>.lock` for its whole duration.

use crate::error::{BootstrapError, Result};
use crate::helpers::internal::fs_utils::{self, io_context};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file path for a state file.
pub fn lock_path(state_file: &Path) -> PathBuf {
    let mut name = state_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Take the run lock for `state_file`. Released when the guard is dropped.
pub fn acquire_run_lock(state_file: &Path) -> Result<RunLock> {
    let path = lock_path(state_file);
    fs_utils::ensure_parent_dir(&path)?;

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| io_context(e, format!("cannot create lock file {}", path.display())))?;

    if file.try_lock_exclusive().is_err() {
        return Err(BootstrapError::Config(format!(
            "another bootstrap run holds {}; if this is incorrect, delete it",
            path.display()
        )));
    }

    Ok(RunLock { _file: file, path })
}

/// Held run lock; unlocks and deletes the lock file on drop.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
