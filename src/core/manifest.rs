//! Library manifests
//!
//! A manifest is a JSON array of library entries:
//!
//! ```json
//! [
//!   { "name": "glm",
//!     "source": { "type": "archive", "url": "https://example.com/glm-0.9.9.8.zip",
//!                 "sha1": "45408897f419944fb28d8fd835791f237be2ec19" } },
//!   { "name": "imgui",
//!     "source": { "type": "git", "url": "https://github.com/ocornut/imgui.git",
//!                 "revision": "v1.89" },
//!     "postprocess": { "type": "patch", "file": "imgui.patch", "pnum": 1 } },
//!   { "name": "generated" }
//! ]
//! ```
//!
//! Malformed JSON is a [`BootstrapError::Parse`]; well-formed JSON that does
//! not describe valid entries is a [`BootstrapError::Schema`].

use crate::error::{BootstrapError, Result};
use crate::helpers::acquire::VcsKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Default number of leading path components stripped by `patch`.
pub const DEFAULT_PNUM: u32 = 3;

fn default_pnum() -> u32 {
    DEFAULT_PNUM
}

/// One declared external library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// `None` means "prepare an empty workspace"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocess: Option<PostProcess>,
}

/// Where a library comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// A single file copied into the workspace as-is
    Sourcefile(FileSource),
    /// An archive extracted into the workspace
    Archive(FileSource),
    Git(RepoSource),
    Hg(RepoSource),
    Svn(RepoSource),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(
        default,
        rename = "user-agent",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// What to do with a library after it has been acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PostProcess {
    Patch {
        file: String,
        #[serde(default = "default_pnum")]
        pnum: u32,
    },
    Script {
        file: String,
    },
}

impl Source {
    pub fn url(&self) -> &str {
        match self {
            Self::Sourcefile(f) | Self::Archive(f) => &f.url,
            Self::Git(r) | Self::Hg(r) | Self::Svn(r) => &r.url,
        }
    }

    /// The VCS kind and repository settings, for VCS sources.
    pub fn repository(&self) -> Option<(VcsKind, &RepoSource)> {
        match self {
            Self::Git(r) => Some((VcsKind::Git, r)),
            Self::Hg(r) => Some((VcsKind::Hg, r)),
            Self::Svn(r) => Some((VcsKind::Svn, r)),
            Self::Sourcefile(_) | Self::Archive(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sourcefile(_) => "sourcefile",
            Self::Archive(_) => "archive",
            Self::Git(_) => "git",
            Self::Hg(_) => "hg",
            Self::Svn(_) => "svn",
        }
    }
}

impl RepoSource {
    /// The pinned revision, treating `""` as unpinned.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref().filter(|r| !r.is_empty())
    }
}

impl ManifestEntry {
    /// An entry without source or post-processing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            postprocess: None,
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BootstrapError::Schema(format!(
                "library #{} has an empty 'name'",
                index + 1
            )));
        }
        if !is_plain_name(&self.name) {
            return Err(BootstrapError::Schema(format!(
                "library #{}: '{}' is not a plain directory name",
                index + 1,
                self.name
            )));
        }
        if let Some(source) = &self.source {
            if source.url().is_empty() {
                return Err(BootstrapError::Schema(format!(
                    "{}: 'source' object has an empty 'url'",
                    self.name
                )));
            }
            if let Source::Svn(repo) = source
                && repo.revision().is_some()
            {
                return Err(BootstrapError::Config(format!(
                    "{}: updating to a revision is not supported for svn",
                    self.name
                )));
            }
        }
        if let Some(PostProcess::Patch { file, .. } | PostProcess::Script { file }) =
            &self.postprocess
            && file.is_empty()
        {
            return Err(BootstrapError::Schema(format!(
                "{}: 'postprocess' object has an empty 'file'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Parse a manifest document.
///
/// `origin` only names the document in error messages.
pub fn parse(json: &str, origin: &Path) -> Result<Vec<ManifestEntry>> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|source| BootstrapError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

    let serde_json::Value::Array(items) = value else {
        return Err(BootstrapError::Schema(format!(
            "{}: expected an array of libraries",
            origin.display()
        )));
    };

    let mut entries = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let entry: ManifestEntry = serde_json::from_value(item).map_err(|e| {
            BootstrapError::Schema(format!(
                "{}: library #{}: {}",
                origin.display(),
                index + 1,
                e
            ))
        })?;
        entry.validate(index)?;
        if !seen.insert(entry.name.clone()) {
            return Err(BootstrapError::Schema(format!(
                "{}: library '{}' is declared more than once",
                origin.display(),
                entry.name
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Read and parse a manifest file.
pub fn load(path: &Path) -> Result<Vec<ManifestEntry>> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        BootstrapError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse(&json, path)
}

/// Overlay `local` onto `canonical`.
///
/// A local entry replaces the canonical entry of the same name in place;
/// local-only entries are appended in their own order.
pub fn merge(canonical: Vec<ManifestEntry>, local: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    let mut merged = canonical;
    for entry in local {
        match merged.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => merged.push(entry),
        }
    }
    merged
}

/// Load the canonical manifest and, if given, merge a local override into it.
pub fn load_merged(canonical: &Path, local: Option<&Path>) -> Result<Vec<ManifestEntry>> {
    let entries = load(canonical)?;
    match local {
        Some(local) => Ok(merge(entries, load(local)?)),
        None => Ok(entries),
    }
}

/// A name is used as a directory under `src/`, so it must be a single
/// normal path component.
fn is_plain_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}
