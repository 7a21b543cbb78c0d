//! Bootstrap error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

/// Errors that can occur while bootstrapping libraries.
///
/// `Parse`, `Schema` and `Config` are fatal: they abort a run before any
/// library is touched. Everything else fails only the library being processed.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("acquisition failed: {0}")]
    Acquire(String),

    #[error("hash of {path} ({actual}) differs from expected hash ({expected})")]
    Verify {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("post-processing failed: {0}")]
    PostProcess(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("command failed: {cmd} (exit code: {code:?})")]
    CommandFailed { cmd: String, code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Schema(_) | Self::Config(_))
    }

    pub(crate) fn acquire(reason: impl std::fmt::Display) -> Self {
        Self::Acquire(reason.to_string())
    }

    pub(crate) fn extract(reason: impl std::fmt::Display) -> Self {
        Self::Extract(reason.to_string())
    }

    pub(crate) fn post_process(reason: impl std::fmt::Display) -> Self {
        Self::PostProcess(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BootstrapError::Schema("x".into()).is_fatal());
        assert!(BootstrapError::Config("x".into()).is_fatal());
        assert!(!BootstrapError::Acquire("x".into()).is_fatal());
        assert!(
            !BootstrapError::Timeout {
                operation: "download".into(),
                secs: 5
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_verify_message_names_both_hashes() {
        let err = BootstrapError::Verify {
            path: PathBuf::from("archives/foo.zip"),
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaa"));
        assert!(msg.contains("bbb"));
        assert!(msg.contains("foo.zip"));
    }
}
