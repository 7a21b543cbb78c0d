//! Bootstrap CLI - fetch the third-party libraries listed in a manifest
//!
//! Usage:
//!   bootstrap                          Bootstrap every library
//!   bootstrap --list                   List libraries and exit
//!   bootstrap -n glfw -n glm           Bootstrap only these libraries
//!   bootstrap -N names.txt --skip imgui
//!   bootstrap --clean-all              Re-download and re-extract everything
//!
//! Files given on the command line are relative to the current directory.
//! Without --bootstrap-file the manifest is `<base-dir>/bootstrap.json`.

use anyhow::{Context, Result};
use clap::Parser;
use levitate_bootstrap::config::{
    DEFAULT_BOOTSTRAP_FILE, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
    DEFAULT_HTTP_TIMEOUT_SECS,
};
use levitate_bootstrap::core::{manifest, orchestrator};
use levitate_bootstrap::helpers::tools::Tools;
use levitate_bootstrap::{Bootstrapper, Config, LiveBackend, Selection, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const HTTP_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 5..=3600;

#[derive(Parser)]
#[command(name = "bootstrap")]
#[command(about = "Fetch and prepare third-party libraries from a JSON manifest")]
#[command(version)]
struct Cli {
    /// List libraries in the manifest and exit
    #[arg(short, long)]
    list: bool,

    /// Bootstrap only this library (repeatable)
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    names: Vec<String>,

    /// Read library names from a file, one per line (repeatable; relative to the current directory)
    #[arg(short = 'N', long = "name-file", value_name = "FILE")]
    name_files: Vec<PathBuf>,

    /// Do not bootstrap this library, even if selected by name (repeatable)
    #[arg(long = "skip", value_name = "NAME")]
    skip: Vec<String>,

    /// Ignore the cached state and recreate each library directory
    #[arg(short, long)]
    clean: bool,

    /// Like --clean, and also re-download cached archive files
    #[arg(short = 'C', long)]
    clean_all: bool,

    /// Base directory holding src/, archives/, snapshots/ and patches/
    #[arg(short, long, env = "BOOTSTRAP_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Canonical manifest (relative to the current directory) [default: <BASE_DIR>/bootstrap.json]
    #[arg(long, value_name = "FILE")]
    bootstrap_file: Option<PathBuf>,

    /// Local manifest whose entries override the canonical ones by name (relative to the current directory)
    #[arg(long, value_name = "FILE")]
    local_bootstrap_file: Option<PathBuf>,

    /// Extract tar archives with the tar executable
    #[arg(long)]
    use_tar: bool,

    /// Extract zip archives with the unzip executable
    #[arg(long)]
    use_unzip: bool,

    /// Create a snapshot archive of every synced repository
    #[arg(long)]
    repo_snapshots: bool,

    /// Mirror to fall back to when a library cannot be acquired
    #[arg(long, env = "BOOTSTRAP_FALLBACK_URL", value_name = "URL")]
    fallback_url: Option<String>,

    /// Acquire every library from the fallback mirror
    #[arg(long)]
    force_fallback: bool,

    /// Print debug output, including every external command
    #[arg(short, long)]
    debug_output: bool,

    /// Stop at the first library that fails
    #[arg(long)]
    break_on_first_error: bool,

    /// Download connect/read timeout in seconds (5-3600)
    #[arg(long, env = "BOOTSTRAP_HTTP_TIMEOUT", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout: u64,

    /// Limit for a whole download in seconds
    #[arg(long, env = "BOOTSTRAP_DOWNLOAD_TIMEOUT", default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    download_timeout: u64,

    /// Timeout for external commands in seconds (0 = none)
    #[arg(long, env = "BOOTSTRAP_COMMAND_TIMEOUT", default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS)]
    command_timeout: u64,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

/// Make a command-line path absolute against the current directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let base_dir = absolute(&self.base_dir)?;
        let bootstrap_file = match &self.bootstrap_file {
            Some(file) => absolute(file)?,
            None => base_dir.join(DEFAULT_BOOTSTRAP_FILE),
        };
        let mut config = Config::new(&base_dir).with_bootstrap_file(bootstrap_file);
        if let Some(local) = &self.local_bootstrap_file {
            config = config.with_local_bootstrap_file(absolute(local)?);
        }
        if let Some(url) = &self.fallback_url {
            config = config.with_fallback_url(url.as_str());
        }

        config.use_tar = self.use_tar;
        config.use_unzip = self.use_unzip;
        config.repo_snapshots = self.repo_snapshots;
        config.force_fallback = self.force_fallback;
        config.clean = self.clean || self.clean_all;
        config.clean_archives = self.clean_all;
        config.break_on_first_error = self.break_on_first_error;
        config.debug_output = self.debug_output;
        config.http_timeout = Duration::from_secs(
            self.http_timeout
                .clamp(*HTTP_TIMEOUT_RANGE.start(), *HTTP_TIMEOUT_RANGE.end()),
        );
        config.download_timeout = Duration::from_secs(self.download_timeout.max(1));
        config.command_timeout =
            (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout));
        Ok(config)
    }

    fn selection(&self) -> Result<Selection> {
        let mut names = self.names.clone();
        for file in &self.name_files {
            names.extend(orchestrator::read_name_file(&absolute(file)?)?);
        }
        Ok(Selection {
            names,
            skip: self.skip.clone(),
        })
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug_output);

    let mut config = cli.config()?;
    tracing::debug!("bootstrap file: {}", config.bootstrap_file.display());

    let entries = manifest::load_merged(
        &config.bootstrap_file,
        config.local_bootstrap_file.as_deref(),
    )
    .context("cannot load library manifest")?;

    if cli.list {
        for entry in &entries {
            println!("{}", entry.name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    config.tools = Tools::discover(config.use_tar, config.use_unzip);
    let selection = cli.selection()?;
    for name in selection.names.iter().chain(&selection.skip) {
        if !entries.iter().any(|e| &e.name == name) {
            output::warning(&format!("library {} is not in the manifest", name));
        }
    }

    let bootstrapper = Bootstrapper::new(&config, LiveBackend::new(&config));
    let report = bootstrapper
        .run(&entries, &selection)
        .context("bootstrap aborted")?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
