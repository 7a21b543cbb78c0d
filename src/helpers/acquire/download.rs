//! Downloads into the shared archive cache
//!
//! Files are cached under their URL-derived filename. A cached file is reused
//! unless a download is forced or its SHA-1 no longer matches the manifest,
//! in which case it is fetched again. The final hash check turns any remaining
//! mismatch into a `VerifyError`.
//!
//! `http(s)://` URLs are fetched in-process, `file://` URLs are copied and
//! `ssh://` URLs are copied with the external `scp` client.

use crate::config::Config;
use crate::core::output;
use crate::error::{BootstrapError, Result};
use crate::helpers::internal::fs_utils::{self, io_context};
use crate::helpers::internal::hash;
use crate::helpers::cmd::ToolCmd;
use crate::helpers::internal::progress::{self, ProgressGuard};
use crate::helpers::internal::url_utils::{self, UrlScheme};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str = concat!("levitate-bootstrap/", env!("CARGO_PKG_VERSION"));

/// A single file to fetch into a cache directory.
#[derive(Debug, Clone)]
pub struct Download<'a> {
    pub url: &'a str,
    pub dest_dir: &'a Path,
    pub sha1: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    /// Re-download even if a hash-valid copy is cached
    pub force: bool,
    /// Connect and per-read stall timeout
    pub timeout: Duration,
    /// Limit for the whole transfer
    pub deadline: Option<Duration>,
    pub scp: &'a Path,
}

impl<'a> Download<'a> {
    pub fn new(url: &'a str, dest_dir: &'a Path, timeout: Duration) -> Self {
        Self {
            url,
            dest_dir,
            sha1: None,
            user_agent: None,
            force: false,
            timeout,
            deadline: None,
            scp: Path::new("scp"),
        }
    }

    /// A download using the timeouts and `scp` client of `config`.
    pub fn from_config(url: &'a str, dest_dir: &'a Path, config: &'a Config) -> Self {
        Self::new(url, dest_dir, config.http_timeout)
            .deadline(Some(config.download_timeout))
            .scp(&config.tools.scp)
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn scp(mut self, scp: &'a Path) -> Self {
        self.scp = scp;
        self
    }

    pub fn sha1(mut self, sha1: Option<&'a str>) -> Self {
        self.sha1 = sha1;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&'a str>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Cache path this download resolves to.
    pub fn target(&self) -> PathBuf {
        self.dest_dir.join(url_utils::filename_from_url(self.url))
    }

    /// Fetch (or reuse) the file and verify it. Returns the cached path.
    pub fn fetch(&self) -> Result<PathBuf> {
        fs_utils::ensure_dir(self.dest_dir)?;
        let target = self.target();
        let expected = hash::expected_hash(self.sha1);
        let mut force = self.force;

        if target.exists()
            && let Some(ref expected) = expected
        {
            let actual = hash::compute_file_hash(&target)?;
            if &actual != expected {
                output::detail(&format!(
                    "hash of {} ({}) does not match expected hash ({}); forcing download",
                    target.display(),
                    actual,
                    expected
                ));
                force = true;
            }
        }

        if !target.exists() || force {
            output::detail(&format!("downloading {}", self.url));
            let bytes = self.transfer(&target)?;
            tracing::debug!("downloaded {} bytes to {}", bytes, target.display());
        } else {
            output::detail(&format!("skipping download of {}; already downloaded", self.url));
        }

        hash::verify_file(&target, expected.as_deref())?;
        Ok(target)
    }

    /// Copy the remote file into `target` via a `.part` file.
    fn transfer(&self, target: &Path) -> Result<u64> {
        let mut part_name = target.as_os_str().to_os_string();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        let result = match UrlScheme::of(self.url) {
            Some(UrlScheme::Http | UrlScheme::Https) => self.transfer_http(&part),
            Some(UrlScheme::File) => self.transfer_file(&part),
            Some(UrlScheme::Ssh) => self.transfer_scp(&part),
            None => Err(BootstrapError::acquire(format!(
                "unsupported URL scheme: {}",
                self.url
            ))),
        };

        match result {
            Ok(bytes) => {
                std::fs::rename(&part, target).map_err(|e| {
                    io_context(e, format!("cannot move download into {}", target.display()))
                })?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e)
            }
        }
    }

    fn transfer_file(&self, part: &Path) -> Result<u64> {
        let src = url_utils::file_url_path(self.url)
            .ok_or_else(|| BootstrapError::acquire(format!("invalid file URL: {}", self.url)))?;
        if !src.is_file() {
            return Err(BootstrapError::acquire(format!(
                "{} does not exist",
                src.display()
            )));
        }
        fs_utils::copy_file(&src, part)
    }

    fn transfer_scp(&self, part: &Path) -> Result<u64> {
        let source = url_utils::scp_source(self.url)
            .ok_or_else(|| BootstrapError::acquire(format!("invalid ssh URL: {}", self.url)))?;

        // -B: batch mode, fail instead of prompting for a password
        let mut cmd = ToolCmd::new(self.scp).args(["-q", "-B"]);
        if let Some(port) = source.port {
            cmd = cmd.arg("-P").arg(port.to_string());
        }
        let cmd = cmd.arg(&source.remote).arg(part).timeout(self.deadline);

        cmd.run().map_err(|e| match e {
            BootstrapError::Timeout { .. } => e,
            other => BootstrapError::acquire(format!("scp of {} failed: {}", self.url, other)),
        })?;
        Ok(std::fs::metadata(part)
            .map_err(|e| io_context(e, format!("scp did not create {}", part.display())))?
            .len())
    }

    fn transfer_http(&self, part: &Path) -> Result<u64> {
        let url = url_utils::encode_url_path(self.url);
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(self.timeout)
            .timeout_read(self.timeout);
        if let Some(deadline) = self.deadline {
            builder = builder.timeout(deadline);
        }
        let agent = builder.build();
        let started = Instant::now();

        let response = agent
            .get(&url)
            .set("User-Agent", self.user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .call()
            .map_err(|e| self.map_http_error(e, started))?;

        let filename = url_utils::filename_from_url(self.url);
        let guard = ProgressGuard::new(progress::create_spinner(&format!(
            "downloading {}",
            filename
        )));
        if let Some(len) = response
            .header("content-length")
            .and_then(|s| s.parse().ok())
        {
            progress::upgrade_to_bytes(guard.bar(), len);
        }

        let mut file = std::fs::File::create(part)
            .map_err(|e| io_context(e, format!("cannot create {}", part.display())))?;
        let mut reader = response.into_reader();
        let mut buffer = vec![0u8; 128 * 1024];
        let mut total = 0u64;

        loop {
            if self.past_deadline(started) {
                return Err(self.timeout_error(started));
            }
            let n = reader
                .read(&mut buffer)
                .map_err(|e| self.map_read_error(e, started))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| io_context(e, format!("write error for {}", part.display())))?;
            total += n as u64;
            guard.bar().set_position(total);
        }
        file.sync_all()?;

        Ok(total)
    }

    fn past_deadline(&self, started: Instant) -> bool {
        self.deadline.is_some_and(|d| started.elapsed() >= d)
    }

    fn map_http_error(&self, err: ureq::Error, started: Instant) -> BootstrapError {
        if is_timeout(&err) {
            return self.timeout_error(started);
        }
        match err {
            ureq::Error::Status(code, _) => {
                BootstrapError::acquire(format!("HTTP {} for {}", code, self.url))
            }
            other => BootstrapError::acquire(format!("download of {} failed: {}", self.url, other)),
        }
    }

    fn map_read_error(&self, err: std::io::Error, started: Instant) -> BootstrapError {
        if is_timeout(&err) {
            self.timeout_error(started)
        } else {
            BootstrapError::acquire(format!("read error while downloading {}: {}", self.url, err))
        }
    }

    /// Reports the overall deadline once it has passed, else the stall timeout.
    fn timeout_error(&self, started: Instant) -> BootstrapError {
        let limit = match self.deadline {
            Some(deadline) if self.past_deadline(started) => deadline,
            _ => self.timeout,
        };
        BootstrapError::Timeout {
            operation: format!("download of {}", self.url),
            secs: limit.as_secs(),
        }
    }
}

/// Whether an error (or anything in its source chain) is an IO timeout.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}
