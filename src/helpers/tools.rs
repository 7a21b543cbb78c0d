//! External tool discovery
//!
//! IDEs and build systems often launch the bootstrapper with a minimal `PATH`,
//! so after a regular `PATH` lookup a few well-known install locations are
//! searched as well.

use crate::core::output;
use std::path::PathBuf;

/// Extra locations searched after `PATH`
const EXTRA_SEARCH_PATHS: &[&str] = &["/usr/local/bin", "/opt/local/bin", "/usr/bin"];

/// Resolved executables for every external tool the bootstrapper may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub git: PathBuf,
    pub hg: PathBuf,
    pub svn: PathBuf,
    pub patch: PathBuf,
    pub tar: PathBuf,
    pub unzip: PathBuf,
    pub python: PathBuf,
    /// Only needed for `ssh://` downloads
    pub scp: PathBuf,
}

impl Default for Tools {
    /// Bare command names, resolved by the OS at spawn time.
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
            hg: PathBuf::from("hg"),
            svn: PathBuf::from("svn"),
            patch: PathBuf::from("patch"),
            tar: PathBuf::from("tar"),
            unzip: PathBuf::from("unzip"),
            python: PathBuf::from(if cfg!(windows) { "python" } else { "python3" }),
            scp: PathBuf::from("scp"),
        }
    }
}

impl Tools {
    /// Resolve every tool. `tar` and `unzip` only warn when missing if the
    /// corresponding external extraction mode is enabled; `scp` never does.
    pub fn discover(use_tar: bool, use_unzip: bool) -> Self {
        let defaults = Self::default();
        Self {
            git: find_tool(&defaults.git, true),
            hg: find_tool(&defaults.hg, true),
            svn: find_tool(&defaults.svn, true),
            patch: find_tool(&defaults.patch, true),
            tar: find_tool(&defaults.tar, use_tar),
            unzip: find_tool(&defaults.unzip, use_unzip),
            python: find_tool(&defaults.python, true),
            scp: find_tool(&defaults.scp, false),
        }
    }
}

/// Find a command on `PATH` or in the extra search paths.
///
/// Falls back to the bare name so the spawn error names the missing tool.
pub fn find_tool(command: &std::path::Path, required: bool) -> PathBuf {
    let found = which::which(command).ok().or_else(|| {
        let extra = std::env::join_paths(EXTRA_SEARCH_PATHS).ok()?;
        let cwd = std::env::current_dir().ok()?;
        which::which_in(command, Some(extra), cwd).ok()
    });

    match found {
        Some(path) => {
            tracing::debug!("found '{}' as {}", command.display(), path.display());
            path
        }
        None => {
            if required {
                output::warning(&format!(
                    "command {} not found, but required by bootstrap",
                    command.display()
                ));
            }
            command.to_path_buf()
        }
    }
}
