//! Common filesystem utilities

use crate::error::{BootstrapError, Result};
use std::io::Write;
use std::path::Path;

/// Attach a human-readable context to an IO error, keeping its kind.
pub fn io_context(err: std::io::Error, what: impl std::fmt::Display) -> BootstrapError {
    BootstrapError::Io(std::io::Error::new(err.kind(), format!("{}: {}", what, err)))
}

/// Create a directory and all its ancestors.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| io_context(e, format!("cannot create directory {}", path.display())))
}

/// Ensure a file's parent directory exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_context(e, format!("cannot remove {}", path.display()))),
    }
}

/// Replace whatever is at `path` with a fresh empty directory.
pub fn reset_dir(path: &Path) -> Result<()> {
    remove_dir_if_exists(path)?;
    ensure_dir(path)
}

/// Copy a file, creating parent directories as needed.
pub fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    ensure_parent_dir(dest)?;
    std::fs::copy(src, dest).map_err(|e| {
        io_context(
            e,
            format!("copy failed: {} -> {}", src.display(), dest.display()),
        )
    })
}

/// Write a file atomically: write to a temp file in the same directory, then rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_context(e, format!("cannot create temp file in {}", dir.display())))?;
    temp.write_all(contents)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| io_context(e, format!("cannot write {}", path.display())))?;
    temp.persist(path)
        .map_err(|e| io_context(e.error, format!("cannot replace {}", path.display())))?;
    Ok(())
}

/// Whether a directory exists and has no entries.
pub fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reset_dir_empties_existing() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("lib");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("stale.txt"), "old").unwrap();

        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(is_empty_dir(&dir));
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let temp = tempdir().unwrap();
        remove_dir_if_exists(&temp.path().join("missing")).unwrap();
    }

    #[test]
    fn test_copy_file_creates_parents() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.txt");
        let dest = temp.path().join("a/b/dest.txt");
        std::fs::write(&src, "content").unwrap();

        copy_file(&src, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        // No temp files left behind
        let count = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_io_context_keeps_kind() {
        let err = io_context(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "cannot open x",
        );
        match err {
            BootstrapError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("cannot open x"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
