//! The bootstrap loop
//!
//! For every selected manifest entry, in manifest order:
//!
//! 1. skip it if the state cache holds an identical entry and its workspace
//!    exists (unless cleaning)
//! 2. drop its cached state and persist that, so an interrupted run never
//!    leaves a stale success record
//! 3. acquire the source (or prepare an empty workspace)
//! 4. run the post-processing step
//! 5. record the entry and persist the state cache
//!
//! Per-library errors are collected and the loop moves on, unless
//! break-on-first-error is set. Fatal errors abort the run.

use crate::config::Config;
use crate::core::backend::Backend;
use crate::core::lock::acquire_run_lock;
use crate::core::manifest::{ManifestEntry, Source};
use crate::core::output;
use crate::core::state::StateCache;
use crate::error::{BootstrapError, Result};
use crate::helpers::internal::fs_utils;
use std::fmt;
use std::path::Path;

/// Which libraries a run covers.
///
/// An empty include list means "all". The skip list wins over the include list.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub names: Vec<String>,
    pub skip: Vec<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn includes(&self, name: &str) -> bool {
        if self.skip.iter().any(|s| s == name) {
            return false;
        }
        self.names.is_empty() || self.names.iter().any(|n| n == name)
    }
}

/// Read a name file: one library name per line, `#` comments and blank lines ignored.
pub fn read_name_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BootstrapError::Config(format!("cannot read name file {}: {}", path.display(), e))
    })?;
    let names: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();
    tracing::debug!("name file {} contains: {}", path.display(), names.join(", "));
    Ok(names)
}

/// Where in a library's processing a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Cache invalidation and workspace preparation
    Prepare,
    Acquire,
    PostProcess,
    /// Recording success in the state cache
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "prepare",
            Self::Acquire => "acquire",
            Self::PostProcess => "postprocess",
            Self::Record => "record",
        })
    }
}

#[derive(Debug)]
pub struct LibraryFailure {
    pub name: String,
    pub stage: Stage,
    pub error: BootstrapError,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Libraries acquired and post-processed in this run
    pub processed: Vec<String>,
    /// Libraries skipped because their cached state matched
    pub cached: Vec<String>,
    /// Libraries excluded by the selection
    pub skipped: Vec<String>,
    pub failures: Vec<LibraryFailure>,
    /// Stopped early because of break-on-first-error
    pub halted: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

enum Outcome {
    Cached,
    Processed,
}

/// Drives a [`Backend`] over a manifest.
pub struct Bootstrapper<'a, B: Backend> {
    config: &'a Config,
    backend: B,
}

impl<'a, B: Backend> Bootstrapper<'a, B> {
    pub fn new(config: &'a Config, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bootstrap the selected entries of `manifest`.
    ///
    /// Returns `Err` only for fatal errors; library failures are in the report.
    pub fn run(&self, manifest: &[ManifestEntry], selection: &Selection) -> Result<RunReport> {
        self.config.validate()?;

        let state_file = self.config.state_file();
        let _lock = acquire_run_lock(&state_file)?;
        let mut state = StateCache::load(&state_file)?;
        tracing::debug!("state file: {}", state_file.display());

        fs_utils::ensure_dir(&self.config.src_dir)?;
        fs_utils::ensure_dir(&self.config.archive_dir)?;

        let mut report = RunReport::default();
        let (selected, skipped): (Vec<_>, Vec<_>) =
            manifest.iter().partition(|e| selection.includes(&e.name));
        report.skipped = skipped.into_iter().map(|e| e.name.clone()).collect();

        output::action(&format!("Bootstrapping {} libraries", selected.len()));

        for (index, entry) in selected.iter().enumerate() {
            output::library(index + 1, selected.len(), &entry.name);

            match self.process(entry, &mut state) {
                Ok(Outcome::Cached) => report.cached.push(entry.name.clone()),
                Ok(Outcome::Processed) => report.processed.push(entry.name.clone()),
                Err(failure) if failure.error.is_fatal() => return Err(failure.error),
                Err(failure) => {
                    output::error(&format!(
                        "failure to bootstrap library {} during {}: {}",
                        failure.name, failure.stage, failure.error
                    ));
                    report.failures.push(failure);
                    if self.config.break_on_first_error {
                        report.halted = true;
                        break;
                    }
                }
            }
        }

        self.summarize(&report);
        if report.is_success() {
            self.touch_state(&state);
        }
        Ok(report)
    }

    /// Bump the state file's timestamp after a clean run. Every entry is
    /// already persisted, so a failure here is only worth a warning.
    fn touch_state(&self, state: &StateCache) {
        if let Err(e) = state.touch() {
            output::warning(&format!("could not update state file timestamp: {}", e));
        }
    }

    fn process(
        &self,
        entry: &ManifestEntry,
        state: &mut StateCache,
    ) -> std::result::Result<Outcome, LibraryFailure> {
        let fail = |stage: Stage| {
            move |error: BootstrapError| LibraryFailure {
                name: entry.name.clone(),
                stage,
                error,
            }
        };
        let workspace = self.config.library_dir(&entry.name);

        if !self.config.clean && state.is_hit(entry, workspace.is_dir()) {
            output::skip(&format!(
                "cached state for {} equals expected state; skipping library",
                entry.name
            ));
            return Ok(Outcome::Cached);
        }

        state.invalidate(&entry.name);
        state.persist().map_err(fail(Stage::Prepare))?;

        if self.config.clean {
            output::sub_action("clean");
            fs_utils::remove_dir_if_exists(&workspace).map_err(fail(Stage::Prepare))?;
        }

        match &entry.source {
            Some(source) => {
                // A single file is fetched by name, so an old one would linger.
                // Archives are replaced on extraction and checkouts update in place.
                if matches!(source, Source::Sourcefile(_)) {
                    fs_utils::reset_dir(&workspace).map_err(fail(Stage::Prepare))?;
                } else {
                    fs_utils::ensure_dir(&workspace).map_err(fail(Stage::Prepare))?;
                }
                output::sub_action(&format!("acquire {} {}", source.kind(), source.url()));
                self.backend
                    .acquire(&entry.name, source, &workspace)
                    .map_err(fail(Stage::Acquire))?;
            }
            None => {
                output::sub_action("prepare empty directory");
                fs_utils::reset_dir(&workspace).map_err(fail(Stage::Prepare))?;
            }
        }

        if let Some(step) = &entry.postprocess {
            output::sub_action("postprocess");
            self.backend
                .post_process(&entry.name, step, &workspace)
                .map_err(fail(Stage::PostProcess))?;
        }

        state.record(entry);
        state.persist().map_err(fail(Stage::Record))?;
        Ok(Outcome::Processed)
    }

    fn summarize(&self, report: &RunReport) {
        output::info(&format!(
            "{} processed, {} cached, {} skipped, {} failed",
            report.processed.len(),
            report.cached.len(),
            report.skipped.len(),
            report.failures.len()
        ));
        if report.is_success() {
            output::success("Finished");
            return;
        }
        let failures: Vec<(String, String)> = report
            .failures
            .iter()
            .map(|f| (f.name.clone(), format!("({}: {})", f.stage, f.error)))
            .collect();
        output::failure_summary(&failures);
    }
}
