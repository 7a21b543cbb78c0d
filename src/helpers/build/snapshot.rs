//! Repository snapshots
//!
//! A snapshot is a `.tar.gz` of a synced checkout whose only top-level entry
//! is the repository directory. Snapshots are what a fallback mirror serves
//! for VCS libraries.

use crate::error::{BootstrapError, Result};
use crate::helpers::internal::fs_utils::{self, io_context};
use crate::helpers::internal::progress;
use std::fs::File;
use std::path::Path;

/// Snapshot filename for a library: `<name>.tar.gz` or `<name>_<rev>.tar.gz`.
pub fn snapshot_name(name: &str, revision: Option<&str>) -> String {
    match revision.filter(|r| !r.is_empty()) {
        Some(rev) => format!("{}_{}.tar.gz", name, rev),
        None => format!("{}.tar.gz", name),
    }
}

/// Package `repo_dir` into `archive`.
///
/// With `replace_existing` an old snapshot is removed first; otherwise an
/// existing snapshot is overwritten in place.
pub fn create_snapshot(repo_dir: &Path, archive: &Path, replace_existing: bool) -> Result<()> {
    if replace_existing && archive.exists() {
        tracing::debug!("removing snapshot {} before creating a new one", archive.display());
        std::fs::remove_file(archive)
            .map_err(|e| io_context(e, format!("cannot remove {}", archive.display())))?;
    }
    fs_utils::ensure_parent_dir(archive)?;

    let top = repo_dir.file_name().ok_or_else(|| {
        BootstrapError::extract(format!("cannot snapshot {}", repo_dir.display()))
    })?;

    progress::with_spinner(&format!("creating snapshot {}", archive.display()), || {
        let file = File::create(archive)
            .map_err(|e| io_context(e, format!("cannot create {}", archive.display())))?;
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder
            .append_dir_all(top, repo_dir)
            .map_err(|e| io_context(e, format!("cannot archive {}", repo_dir.display())))?;
        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| io_context(e, format!("cannot write {}", archive.display())))?;
        Ok(())
    })
}
