//! Run configuration
//!
//! A [`Config`] is built once at startup (normally from the command line) and
//! handed by reference to every component. Nothing in the crate reads
//! process-wide state for paths, tool locations or verbosity.

use crate::error::{BootstrapError, Result};
use crate::helpers::tools::Tools;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the base dir holding one workspace per library.
pub const SRC_DIR_BASE: &str = "src";
/// Directory under the base dir holding downloaded raw files.
pub const ARCHIVE_DIR_BASE: &str = "archives";
/// Directory under the base dir holding repository snapshots.
pub const SNAPSHOT_DIR_BASE: &str = "snapshots";
/// Directory under the base dir holding patch files and scripts.
pub const PATCHES_DIR_BASE: &str = "patches";
/// Default canonical manifest file name.
pub const DEFAULT_BOOTSTRAP_FILE: &str = "bootstrap.json";

/// Default per-operation HTTP timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Default limit for a whole download in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;
/// Default limit for a single external command in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Bootstrap configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub src_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub patches_dir: PathBuf,
    pub bootstrap_file: PathBuf,
    pub local_bootstrap_file: Option<PathBuf>,
    pub tools: Tools,
    /// Extract tar archives with the `tar` executable
    pub use_tar: bool,
    /// Extract zip archives with the `unzip` executable
    pub use_unzip: bool,
    pub fallback_url: Option<String>,
    pub force_fallback: bool,
    pub repo_snapshots: bool,
    /// Ignore the state cache and wipe each workspace first
    pub clean: bool,
    /// Also re-download files already present in the archive cache
    pub clean_archives: bool,
    pub break_on_first_error: bool,
    pub debug_output: bool,
    /// Connect and per-read stall timeout for downloads
    pub http_timeout: Duration,
    /// Upper bound for a whole download, including `scp` transfers
    pub download_timeout: Duration,
    /// Upper bound for a single external command (VCS, patch, tar). `None` = unbounded.
    pub command_timeout: Option<Duration>,
}

impl Config {
    /// Create a configuration rooted at `base_dir` with default settings.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            src_dir: base_dir.join(SRC_DIR_BASE),
            archive_dir: base_dir.join(ARCHIVE_DIR_BASE),
            snapshot_dir: base_dir.join(SNAPSHOT_DIR_BASE),
            patches_dir: base_dir.join(PATCHES_DIR_BASE),
            bootstrap_file: base_dir.join(DEFAULT_BOOTSTRAP_FILE),
            local_bootstrap_file: None,
            tools: Tools::default(),
            use_tar: false,
            use_unzip: false,
            fallback_url: None,
            force_fallback: false,
            repo_snapshots: false,
            clean: false,
            clean_archives: false,
            break_on_first_error: false,
            debug_output: false,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            command_timeout: Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
            base_dir,
        }
    }

    pub fn with_bootstrap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_file = path.into();
        self
    }

    pub fn with_local_bootstrap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_bootstrap_file = Some(path.into());
        self
    }

    /// Set the fallback mirror. Empty strings count as "no fallback".
    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.fallback_url = (!url.trim().is_empty()).then_some(url);
        self
    }

    pub fn with_tools(mut self, tools: Tools) -> Self {
        self.tools = tools;
        self
    }

    /// Reject contradictory settings before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.force_fallback && self.fallback_url.is_none() {
            return Err(BootstrapError::Config(
                "cannot force usage of the fallback location without specifying a fallback URL"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Hidden state file colocated with the canonical manifest.
    ///
    /// `deps/bootstrap.json` -> `deps/.bootstrap.json`
    pub fn state_file(&self) -> PathBuf {
        state_file_for(&self.bootstrap_file)
    }

    /// Workspace directory for a library.
    pub fn library_dir(&self, name: &str) -> PathBuf {
        self.src_dir.join(name)
    }
}

fn state_file_for(bootstrap_file: &Path) -> PathBuf {
    let file_name = bootstrap_file
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_FILE.to_string());
    bootstrap_file.with_file_name(format!(".{}", file_name))
}
