//! Cached state of fully processed libraries
//!
//! The state file holds the manifest entries, verbatim, that were last
//! acquired and post-processed without error. A library is skipped when its
//! current entry equals the stored one and its workspace still exists.
//!
//! The file is rewritten after every library so an interrupted run keeps
//! credit for the libraries it already finished.

use crate::core::manifest::ManifestEntry;
use crate::core::output;
use crate::error::Result;
use crate::helpers::internal::fs_utils;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct StateCache {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl StateCache {
    /// Load the cache at `path`; a missing file is an empty cache.
    ///
    /// A corrupt file is also treated as empty: it can only cause extra work.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Vec<ManifestEntry>>(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    output::warning(&format!(
                        "ignoring unreadable state file {}: {}",
                        path.display(),
                        e
                    ));
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(fs_utils::io_context(
                    e,
                    format!("cannot read {}", path.display()),
                ));
            }
        };
        tracing::debug!("loaded {} cached entries from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Whether `entry` was processed before, unchanged, and its workspace exists.
    pub fn is_hit(&self, entry: &ManifestEntry, workspace_exists: bool) -> bool {
        workspace_exists && self.entries.iter().any(|cached| cached == entry)
    }

    /// Forget any cached state for `name`.
    pub fn invalidate(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    /// Record `entry` as fully processed, replacing older state for its name.
    pub fn record(&mut self, entry: &ManifestEntry) {
        self.invalidate(&entry.name);
        self.entries.push(entry.clone());
    }

    /// Write the cache to disk atomically.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec(&self.entries).map_err(std::io::Error::other)?;
        fs_utils::write_atomic(&self.path, &json)
    }

    /// Rewrite the state file to mark a completed run.
    pub fn touch(&self) -> Result<()> {
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{RepoSource, Source};

    fn git_entry(name: &str, revision: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            name: name.to_string(),
            source: Some(Source::Git(RepoSource {
                url: format!("https://example.com/{name}.git"),
                revision: revision.map(String::from),
            })),
            postprocess: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let temp = tempfile::tempdir().unwrap();
        let cache = StateCache::load(&temp.path().join(".bootstrap.json")).unwrap();
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty_cache() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(".bootstrap.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = StateCache::load(&path).unwrap();
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_hit_requires_equal_entry_and_workspace() {
        let mut cache = StateCache {
            path: PathBuf::from("unused"),
            entries: Vec::new(),
        };
        let entry = git_entry("glfw", Some("3.3"));
        cache.record(&entry);

        assert!(cache.is_hit(&entry, true));
        assert!(!cache.is_hit(&entry, false));
        assert!(!cache.is_hit(&git_entry("glfw", Some("3.4")), true));
        assert!(!cache.is_hit(&git_entry("glm", Some("3.3")), true));
    }

    #[test]
    fn test_record_replaces_and_invalidate_removes() {
        let mut cache = StateCache {
            path: PathBuf::from("unused"),
            entries: Vec::new(),
        };
        cache.record(&git_entry("a", Some("1")));
        cache.record(&git_entry("b", None));
        cache.record(&git_entry("a", Some("2")));
        assert_eq!(cache.entries().len(), 2);
        assert!(cache.is_hit(&git_entry("a", Some("2")), true));

        cache.invalidate("a");
        assert_eq!(cache.entries(), &[git_entry("b", None)]);
    }

    #[test]
    fn test_persist_and_reload() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(".bootstrap.json");

        let mut cache = StateCache::load(&path).unwrap();
        cache.record(&git_entry("imgui", Some("v1.89")));
        cache.record(&ManifestEntry::empty("generated"));
        cache.persist().unwrap();

        let reloaded = StateCache::load(&path).unwrap();
        assert_eq!(reloaded.entries(), cache.entries());
    }
}
