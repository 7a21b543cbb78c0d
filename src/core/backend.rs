//! Acquisition and post-processing backends
//!
//! The orchestrator only talks to a [`Backend`]. [`LiveBackend`] does the real
//! work: downloads, extraction, VCS operations, fallback mirror retries,
//! snapshots, patches and scripts. Tests substitute their own backend to count
//! or fail calls.

use crate::config::Config;
use crate::core::fallback::FallbackMirror;
use crate::core::manifest::{FileSource, PostProcess, Source};
use crate::core::output;
use crate::error::{BootstrapError, Result};
use crate::helpers::acquire::{Download, VcsKind, VcsSync};
use crate::helpers::build::{Extractor, create_snapshot, snapshot_name};
use crate::helpers::internal::fs_utils;
use crate::helpers::postprocess::PostProcessor;
use std::path::{Path, PathBuf};

/// Work performed for a single library.
pub trait Backend {
    /// Populate `workspace` from `source`. The workspace directory exists.
    fn acquire(&self, name: &str, source: &Source, workspace: &Path) -> Result<()>;

    /// Run a post-processing step against an acquired workspace.
    fn post_process(&self, name: &str, step: &PostProcess, workspace: &Path) -> Result<()>;
}

/// Backend performing real network, VCS and filesystem operations.
pub struct LiveBackend<'a> {
    config: &'a Config,
}

impl<'a> LiveBackend<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn download(&self, file: &FileSource) -> Result<PathBuf> {
        Download::from_config(&file.url, &self.config.archive_dir, self.config)
            .sha1(file.sha1.as_deref())
            .user_agent(file.user_agent.as_deref())
            .force(self.config.clean_archives)
            .fetch()
    }

    /// Put a downloaded file into place according to the source type.
    fn install(&self, source: &Source, downloaded: &Path, workspace: &Path) -> Result<()> {
        match source {
            Source::Archive(_) => Extractor::from_config(self.config).extract(downloaded, workspace),
            _ => {
                let filename = downloaded.file_name().ok_or_else(|| {
                    BootstrapError::acquire(format!("no filename in {}", downloaded.display()))
                })?;
                fs_utils::copy_file(downloaded, &workspace.join(filename)).map(|_| ())
            }
        }
    }

    fn acquire_primary(&self, name: &str, source: &Source, workspace: &Path) -> Result<()> {
        let (kind, repo) = match source {
            Source::Sourcefile(file) | Source::Archive(file) => {
                let downloaded = self.download(file)?;
                return self.install(source, &downloaded, workspace);
            }
            Source::Git(repo) => (VcsKind::Git, repo),
            Source::Hg(repo) => (VcsKind::Hg, repo),
            Source::Svn(repo) => (VcsKind::Svn, repo),
        };

        VcsSync::from_config(self.config).sync(kind, &repo.url, repo.revision(), workspace, false)?;
        if self.config.repo_snapshots {
            self.snapshot(name, repo.revision(), workspace);
        }
        Ok(())
    }

    fn snapshot(&self, name: &str, revision: Option<&str>, workspace: &Path) {
        let archive = self.config.snapshot_dir.join(snapshot_name(name, revision));
        output::detail(&format!("creating snapshot {}", archive.display()));
        if let Err(e) = create_snapshot(workspace, &archive, revision.is_none()) {
            output::warning(&format!("cannot create snapshot of {}: {}", name, e));
        }
    }

    fn acquire_fallback(
        &self,
        mirror: FallbackMirror<'_>,
        name: &str,
        source: &Source,
        workspace: &Path,
    ) -> Result<()> {
        let (kind, repo) = match source {
            Source::Sourcefile(file) | Source::Archive(file) => {
                let downloaded = mirror.fetch_file(file)?;
                return self.install(source, &downloaded, workspace);
            }
            Source::Git(repo) => (VcsKind::Git, repo),
            Source::Hg(repo) => (VcsKind::Hg, repo),
            Source::Svn(repo) => (VcsKind::Svn, repo),
        };

        let snapshot = mirror.fetch_snapshot(name, repo.revision())?;
        Extractor::from_config(self.config).extract(&snapshot, workspace)?;
        VcsSync::from_config(self.config).sync(kind, &repo.url, repo.revision(), workspace, true)
    }
}

impl Backend for LiveBackend<'_> {
    fn acquire(&self, name: &str, source: &Source, workspace: &Path) -> Result<()> {
        let mirror = FallbackMirror::from_config(self.config);

        if !self.config.force_fallback {
            let err = match self.acquire_primary(name, source, workspace) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            let Some(mirror) = mirror.filter(|_| !err.is_fatal()) else {
                if matches!(source, Source::Sourcefile(_)) {
                    fs_utils::remove_dir_if_exists(workspace)?;
                }
                return Err(err);
            };
            output::warning(&format!(
                "acquiring {} from {} failed ({}); trying fallback",
                name,
                source.url(),
                err
            ));
            return self.acquire_fallback(mirror, name, source, workspace);
        }

        let mirror = mirror.ok_or_else(|| {
            BootstrapError::Config(
                "cannot force usage of the fallback location without specifying a fallback URL"
                    .to_string(),
            )
        })?;
        self.acquire_fallback(mirror, name, source, workspace)
    }

    fn post_process(&self, name: &str, step: &PostProcess, workspace: &Path) -> Result<()> {
        let post = PostProcessor::new(self.config);
        match step {
            PostProcess::Patch { file, pnum } => post.apply_patch(file, *pnum, workspace),
            PostProcess::Script { file } => post.run_script(file, name, workspace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::tools::Tools;

    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn file_source(url: String, sha1: Option<&str>) -> FileSource {
        FileSource {
            url,
            sha1: sha1.map(String::from),
            user_agent: None,
        }
    }

    #[test]
    fn test_sourcefile_is_copied_into_workspace() {
        let temp = tempfile::tempdir().unwrap();
        let upstream = temp.path().join("upstream/hello.h");
        std::fs::create_dir_all(upstream.parent().unwrap()).unwrap();
        std::fs::write(&upstream, "hello world").unwrap();

        let config = Config::new(temp.path().join("base"));
        let workspace = config.library_dir("hello");
        std::fs::create_dir_all(&workspace).unwrap();

        let source = Source::Sourcefile(file_source(
            format!("file://{}", upstream.display()),
            Some(HELLO_SHA1),
        ));
        LiveBackend::new(&config)
            .acquire("hello", &source, &workspace)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(workspace.join("hello.h")).unwrap(),
            "hello world"
        );
        assert!(config.archive_dir.join("hello.h").is_file());
    }

    #[test]
    fn test_failed_sourcefile_without_fallback_removes_workspace() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::new(temp.path());
        let workspace = config.library_dir("gone");
        std::fs::create_dir_all(&workspace).unwrap();

        let source = Source::Sourcefile(file_source(
            format!("file://{}/missing.h", temp.path().display()),
            None,
        ));
        let err = LiveBackend::new(&config)
            .acquire("gone", &source, &workspace)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Acquire(_)));
        assert!(!workspace.exists());
    }

    #[test]
    fn test_verify_error_falls_back_to_mirror() {
        let temp = tempfile::tempdir().unwrap();
        let upstream = temp.path().join("upstream/hello.h");
        let mirror = temp.path().join("mirror/archives/hello.h");
        std::fs::create_dir_all(upstream.parent().unwrap()).unwrap();
        std::fs::create_dir_all(mirror.parent().unwrap()).unwrap();
        std::fs::write(&upstream, "tampered").unwrap();
        std::fs::write(&mirror, "hello world").unwrap();

        let config = Config::new(temp.path().join("base"))
            .with_fallback_url(format!("file://{}/mirror", temp.path().display()));
        let workspace = config.library_dir("hello");
        std::fs::create_dir_all(&workspace).unwrap();

        let source = Source::Sourcefile(file_source(
            format!("file://{}", upstream.display()),
            Some(HELLO_SHA1),
        ));
        LiveBackend::new(&config)
            .acquire("hello", &source, &workspace)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.join("hello.h")).unwrap(),
            "hello world"
        );
    }

    #[test]
    fn test_force_fallback_skips_primary() {
        let temp = tempfile::tempdir().unwrap();
        let mirror = temp.path().join("mirror/archives/hello.h");
        std::fs::create_dir_all(mirror.parent().unwrap()).unwrap();
        std::fs::write(&mirror, "hello world").unwrap();

        let mut config = Config::new(temp.path().join("base"))
            .with_fallback_url(format!("file://{}/mirror", temp.path().display()));
        config.force_fallback = true;
        let workspace = config.library_dir("hello");
        std::fs::create_dir_all(&workspace).unwrap();

        // Primary URL would fail with an unsupported scheme
        let source = Source::Sourcefile(file_source(
            "ftp://example.com/hello.h".to_string(),
            Some(HELLO_SHA1),
        ));
        LiveBackend::new(&config)
            .acquire("hello", &source, &workspace)
            .unwrap();
        assert!(workspace.join("hello.h").is_file());
    }

    #[test]
    fn test_vcs_fallback_uses_snapshot() {
        let Ok(git) = which::which("git") else {
            eprintln!("git not installed, skipping");
            return;
        };
        let temp = tempfile::tempdir().unwrap();

        // Build a repository and snapshot it the way a mirror would
        let repo = temp.path().join("producer/lib");
        std::fs::create_dir_all(&repo).unwrap();
        let git_in = |args: &[&str]| {
            let ok = std::process::Command::new(&git)
                .args(["-c", "user.name=t", "-c", "user.email=t@example.com"])
                .args(args)
                .current_dir(&repo)
                .output()
                .unwrap()
                .status
                .success();
            assert!(ok, "git {args:?}");
        };
        git_in(&["init", "-q"]);
        std::fs::write(repo.join("lib.c"), "int lib;").unwrap();
        git_in(&["add", "."]);
        git_in(&["commit", "-q", "-m", "init"]);
        create_snapshot(&repo, &temp.path().join("mirror/snapshots/lib.tar.gz"), true).unwrap();

        let config = Config::new(temp.path().join("base"))
            .with_fallback_url(format!("file://{}/mirror", temp.path().display()))
            .with_tools(Tools {
                git,
                ..Tools::default()
            });
        let workspace = config.library_dir("lib");
        std::fs::create_dir_all(&workspace).unwrap();

        let source = Source::Git(crate::core::manifest::RepoSource {
            url: format!("{}/does-not-exist", temp.path().display()),
            revision: None,
        });
        LiveBackend::new(&config)
            .acquire("lib", &source, &workspace)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.join("lib.c")).unwrap(),
            "int lib;"
        );
        assert!(workspace.join(".git").is_dir());
    }
}
