//! External command execution
//!
//! Builder for running the external tools the bootstrapper depends on (VCS
//! clients, `patch`, `tar`, `unzip`, script interpreters) with consistent
//! logging, error mapping and an optional wall-clock timeout.

use crate::error::{BootstrapError, Result};
use crate::helpers::internal::fs_utils::io_context;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting on a child with a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builder for an external tool invocation.
///
/// # Example
/// ```ignore
/// ToolCmd::new(&config.tools.git)
///     .args(["-C", dir, "reset", "--hard", "HEAD"])
///     .timeout(config.command_timeout)
///     .run()?;
/// ```
#[derive(Debug, Clone)]
pub struct ToolCmd {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    quiet: bool,
    timeout: Option<Duration>,
}

impl ToolCmd {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            quiet: false,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Set the working directory for the command.
    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Discard the command's stdout and stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Kill the command if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line as it would be typed in a shell.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| {
            let s = a.to_string_lossy();
            if s.contains(' ') {
                format!("\"{}\"", s)
            } else {
                s.into_owned()
            }
        }));
        parts.join(" ")
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd
    }

    fn spawn_and_wait(&self) -> Result<ExitStatus> {
        tracing::debug!(">>> {}", self.display());

        let child = self
            .build_command()
            .spawn()
            .map_err(|e| io_context(e, format!("cannot start {}", self.program.display())))?;

        match self.timeout {
            Some(limit) => self.wait_with_deadline(child, limit),
            None => {
                let mut child = child;
                Ok(child.wait()?)
            }
        }
    }

    fn wait_with_deadline(&self, mut child: Child, limit: Duration) -> Result<ExitStatus> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                // Already-exited races are harmless here
                let _ = child.kill();
                let _ = child.wait();
                return Err(BootstrapError::Timeout {
                    operation: self.display(),
                    secs: limit.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run the command; non-zero exit is a `CommandFailed` error.
    pub fn run(&self) -> Result<()> {
        let status = self.spawn_and_wait()?;
        if !status.success() {
            return Err(BootstrapError::CommandFailed {
                cmd: self.display(),
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Run the command and report whether it exited successfully.
    ///
    /// Failing to start the program is still an error.
    pub fn succeeds(&self) -> Result<bool> {
        Ok(self.spawn_and_wait()?.success())
    }
}
