//! Version-control checkouts (git, hg, svn)
//!
//! A missing checkout is cloned, an existing one is updated in place and then
//! reset to the requested revision with untracked files removed. In local-only
//! mode no network operation is attempted; this is used after a repository
//! snapshot has been unpacked from the fallback mirror.

use crate::config::{Config, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::core::output;
use crate::error::{BootstrapError, Result};
use crate::helpers::cmd::ToolCmd;
use crate::helpers::internal::fs_utils;
use crate::helpers::internal::progress::{self, ProgressGuard};
use crate::helpers::tools::Tools;
use std::path::Path;
use std::time::Duration;

/// Supported version control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
}

impl VcsKind {
    /// Directory marking an existing checkout.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Hg => ".hg",
            Self::Svn => ".svn",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Svn => "svn",
        }
    }
}

/// Runs VCS operations with the resolved tool paths.
#[derive(Debug, Clone)]
pub struct VcsSync<'a> {
    tools: &'a Tools,
    timeout: Option<Duration>,
    quiet: bool,
}

impl<'a> VcsSync<'a> {
    pub fn new(tools: &'a Tools) -> Self {
        Self {
            tools,
            timeout: Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
            quiet: true,
        }
    }

    /// Kill any single VCS command running longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &'a Config) -> Self {
        Self {
            tools: &config.tools,
            timeout: config.command_timeout,
            quiet: !config.debug_output,
        }
    }

    /// Bring `target` to `revision` (latest when `None`) of the repository at `url`.
    pub fn sync(
        &self,
        kind: VcsKind,
        url: &str,
        revision: Option<&str>,
        target: &Path,
        local_only: bool,
    ) -> Result<()> {
        let revision = revision.filter(|r| !r.is_empty());
        if kind == VcsKind::Svn && revision.is_some() {
            return Err(BootstrapError::Config(
                "updating to a revision is not supported for svn".to_string(),
            ));
        }

        let has_checkout = target.join(kind.marker()).is_dir();
        if !has_checkout && local_only {
            return Err(BootstrapError::NotFound(format!(
                "{} checkout in {}; cannot run local operations only",
                kind.name(),
                target.display()
            )));
        }

        let dir_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _spinner = ProgressGuard::new(progress::create_spinner(&format!(
            "{} {}",
            kind.name(),
            dir_name
        )));

        match kind {
            VcsKind::Git => self.sync_git(url, revision, target, has_checkout, local_only),
            VcsKind::Hg => self.sync_hg(url, revision, target, has_checkout, local_only),
            VcsKind::Svn => self.sync_svn(url, target, local_only),
        }
    }

    fn sync_git(
        &self,
        url: &str,
        revision: Option<&str>,
        target: &Path,
        has_checkout: bool,
        local_only: bool,
    ) -> Result<()> {
        let git = &self.tools.git;
        if !has_checkout {
            prepare_clone_target(target)?;
            output::detail(&format!("git clone {}", url));
            self.run(ToolCmd::new(git).args(["clone", "--recursive", url]).arg(target))?;
        } else if !local_only {
            output::detail(&format!(
                "repository {} already exists; fetching instead of cloning",
                target.display()
            ));
            self.run(ToolCmd::new(git).arg("-C").arg(target).args(["fetch", "--recurse-submodules"]))?;
        }

        self.run(
            ToolCmd::new(git)
                .arg("-C")
                .arg(target)
                .args(["reset", "--hard", revision.unwrap_or("HEAD")]),
        )?;
        self.run(ToolCmd::new(git).arg("-C").arg(target).args(["clean", "-fxd"]))
    }

    fn sync_hg(
        &self,
        url: &str,
        revision: Option<&str>,
        target: &Path,
        has_checkout: bool,
        local_only: bool,
    ) -> Result<()> {
        let hg = &self.tools.hg;
        if !has_checkout {
            prepare_clone_target(target)?;
            output::detail(&format!("hg clone {}", url));
            self.run(ToolCmd::new(hg).args(["clone", url]).arg(target))?;
        } else if !local_only {
            output::detail(&format!(
                "repository {} already exists; pulling instead of cloning",
                target.display()
            ));
            self.run(ToolCmd::new(hg).arg("pull").arg("-R").arg(target))?;
        }

        let mut update = ToolCmd::new(hg).arg("update").arg("-R").arg(target).arg("-C");
        if let Some(rev) = revision {
            update = update.arg(rev);
        }
        self.run(update)?;
        self.run(
            ToolCmd::new(hg)
                .arg("purge")
                .arg("-R")
                .arg(target)
                .args(["--config", "extensions.purge="]),
        )
    }

    fn sync_svn(&self, url: &str, target: &Path, local_only: bool) -> Result<()> {
        // svn cannot do anything useful without the server
        if local_only {
            return Ok(());
        }
        prepare_clone_target(target)?;
        output::detail(&format!("svn checkout {}", url));
        self.run(ToolCmd::new(&self.tools.svn).args(["checkout", url]).arg(target))
    }

    fn run(&self, cmd: ToolCmd) -> Result<()> {
        cmd.quiet(self.quiet)
            .timeout(self.timeout)
            .run()
            .map_err(|e| match e {
                BootstrapError::CommandFailed { cmd, code } => BootstrapError::acquire(format!(
                    "{} failed (exit code: {})",
                    cmd,
                    code.map_or_else(|| "none".to_string(), |c| c.to_string())
                )),
                other => other,
            })
    }
}

/// Remove anything at `target` and make sure its parent exists.
fn prepare_clone_target(target: &Path) -> Result<()> {
    if target.exists() {
        tracing::debug!("removing {} before cloning", target.display());
        fs_utils::remove_dir_if_exists(target)?;
    }
    fs_utils::ensure_parent_dir(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn git() -> Option<PathBuf> {
        which::which("git").ok()
    }

    fn git_in(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn head(dir: &Path) -> String {
        let out = std::process::Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    /// Upstream repo with two commits; returns the first commit id.
    fn make_upstream(dir: &Path) -> String {
        std::fs::create_dir_all(dir).unwrap();
        git_in(dir, &["init", "-q"]);
        std::fs::write(dir.join("version.txt"), "1").unwrap();
        git_in(dir, &["add", "."]);
        git_in(dir, &["commit", "-q", "-m", "one"]);
        let first = head(dir);
        std::fs::write(dir.join("version.txt"), "2").unwrap();
        git_in(dir, &["commit", "-q", "-am", "two"]);
        first
    }

    #[test]
    fn test_git_clone_and_pin_revision() {
        let Some(git) = git() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let temp = tempfile::tempdir().unwrap();
        let upstream = temp.path().join("upstream");
        let first = make_upstream(&upstream);
        let tools = Tools {
            git,
            ..Tools::default()
        };
        let vcs = VcsSync::new(&tools);
        let url = upstream.to_string_lossy().into_owned();
        let target = temp.path().join("src/lib");

        vcs.sync(VcsKind::Git, &url, None, &target, false).unwrap();
        assert_eq!(std::fs::read_to_string(target.join("version.txt")).unwrap(), "2");

        // Existing checkout: fetch, reset to pinned revision, drop untracked files
        std::fs::write(target.join("junk.o"), "x").unwrap();
        vcs.sync(VcsKind::Git, &url, Some(&first), &target, false)
            .unwrap();
        assert_eq!(std::fs::read_to_string(target.join("version.txt")).unwrap(), "1");
        assert!(!target.join("junk.o").exists());
    }

    #[test]
    fn test_git_local_only_resets_existing_checkout() {
        let Some(git) = git() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let temp = tempfile::tempdir().unwrap();
        let upstream = temp.path().join("upstream");
        let first = make_upstream(&upstream);
        let tools = Tools {
            git,
            ..Tools::default()
        };
        let vcs = VcsSync::new(&tools);
        let target = temp.path().join("lib");
        vcs.sync(VcsKind::Git, &upstream.to_string_lossy(), None, &target, false)
            .unwrap();

        // Unreachable URL proves nothing touches the network
        vcs.sync(
            VcsKind::Git,
            "https://invalid.invalid/repo.git",
            Some(&first),
            &target,
            true,
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(target.join("version.txt")).unwrap(), "1");
    }

    #[test]
    fn test_local_only_without_checkout_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let tools = Tools::default();
        let err = VcsSync::new(&tools)
            .sync(VcsKind::Git, "https://example.com/x.git", None, temp.path(), true)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn test_svn_revision_is_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let tools = Tools::default();
        let err = VcsSync::new(&tools)
            .sync(
                VcsKind::Svn,
                "https://example.com/svn/trunk",
                Some("1234"),
                &temp.path().join("lib"),
                false,
            )
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_failed_clone_is_acquire_error() {
        let Some(git) = git() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let temp = tempfile::tempdir().unwrap();
        let tools = Tools {
            git,
            ..Tools::default()
        };
        let missing = temp.path().join("no-such-repo");
        let err = VcsSync::new(&tools)
            .sync(
                VcsKind::Git,
                &missing.to_string_lossy(),
                None,
                &temp.path().join("lib"),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Acquire(_)), "got {err:?}");
    }

    /// Stand-in VCS client appending each argument list to `<dir>/<name>.log`.
    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, extra: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join(format!("{name}.log"));
        let script = dir.join(name);
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}", log.display(), extra),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[cfg(unix)]
    fn logged(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_hg_existing_checkout_pulls_updates_and_purges() {
        let temp = tempfile::tempdir().unwrap();
        let (hg, log) = stub_tool(temp.path(), "hg", "");
        let tools = Tools {
            hg,
            ..Tools::default()
        };
        let target = temp.path().join("lib");
        std::fs::create_dir_all(target.join(".hg")).unwrap();

        VcsSync::new(&tools)
            .sync(VcsKind::Hg, "https://hg.example.com/lib", Some("1.2"), &target, false)
            .unwrap();

        let t = target.display();
        assert_eq!(
            logged(&log),
            [
                format!("pull -R {t}"),
                format!("update -R {t} -C 1.2"),
                format!("purge -R {t} --config extensions.purge="),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hg_clone_then_update_to_tip() {
        let temp = tempfile::tempdir().unwrap();
        let (hg, log) = stub_tool(temp.path(), "hg", "");
        let tools = Tools {
            hg,
            ..Tools::default()
        };
        let target = temp.path().join("lib");

        VcsSync::new(&tools)
            .sync(VcsKind::Hg, "https://hg.example.com/lib", None, &target, false)
            .unwrap();

        let t = target.display();
        assert_eq!(
            logged(&log),
            [
                format!("clone https://hg.example.com/lib {t}"),
                format!("update -R {t} -C"),
                format!("purge -R {t} --config extensions.purge="),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_svn_checkout_and_local_only_noop() {
        let temp = tempfile::tempdir().unwrap();
        let (svn, log) = stub_tool(temp.path(), "svn", "");
        let tools = Tools {
            svn,
            ..Tools::default()
        };
        let target = temp.path().join("lib");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.c"), "x").unwrap();

        let vcs = VcsSync::new(&tools);
        vcs.sync(VcsKind::Svn, "https://svn.example.com/trunk", None, &target, false)
            .unwrap();
        assert_eq!(
            logged(&log),
            [format!("checkout https://svn.example.com/trunk {}", target.display())]
        );
        assert!(!target.join("stale.c").exists());

        std::fs::create_dir_all(target.join(".svn")).unwrap();
        vcs.sync(VcsKind::Svn, "https://svn.example.com/trunk", None, &target, true)
            .unwrap();
        assert_eq!(logged(&log).len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_vcs_command_times_out() {
        let temp = tempfile::tempdir().unwrap();
        let (hg, _) = stub_tool(temp.path(), "hg", "sleep 5\n");
        let tools = Tools {
            hg,
            ..Tools::default()
        };
        let target = temp.path().join("lib");
        std::fs::create_dir_all(target.join(".hg")).unwrap();

        let start = std::time::Instant::now();
        let err = VcsSync::new(&tools)
            .timeout(Some(Duration::from_millis(200)))
            .sync(VcsKind::Hg, "https://hg.example.com/lib", None, &target, false)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Timeout { .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
