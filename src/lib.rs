//! Manifest-driven dependency bootstrapper
//!
//! A JSON manifest lists the external libraries a native project needs. Each
//! entry names a source (a single file, an archive, or a git/hg/svn
//! repository) and an optional post-processing step (a patch or a script).
//! Every library is acquired into its own workspace directory under `src/`,
//! verified, post-processed and recorded in a state cache so that later runs
//! only redo libraries whose manifest entry changed.
//!
//! # Example Manifest
//!
//! ```json
//! [
//!   { "name": "glfw",
//!     "source": { "type": "archive",
//!                 "url": "https://github.com/glfw/glfw/releases/download/3.3.8/glfw-3.3.8.zip",
//!                 "sha1": "7b5e4ae1b1b6a3f6b5f4a04e4d8a0eaf4b6f4b32" } },
//!   { "name": "imgui",
//!     "source": { "type": "git", "url": "https://github.com/ocornut/imgui.git",
//!                 "revision": "v1.89" },
//!     "postprocess": { "type": "patch", "file": "imgui.patch", "pnum": 1 } }
//! ]
//! ```
//!
//! # Layout
//!
//! Relative to the base directory:
//!
//! - `src/<name>/` - one workspace per library
//! - `archives/` - downloaded files, shared across runs
//! - `snapshots/` - repository snapshots (`--repo-snapshots`)
//! - `patches/` - patch files and post-processing scripts
//! - `.bootstrap.json` - state cache, next to the manifest
//!
//! # Fallback Mirror
//!
//! With a fallback URL configured, a failed acquisition is retried from
//! `<fallback>/archives/<filename>` (files and archives) or
//! `<fallback>/snapshots/<name>[_<revision>].tar.gz` (repositories).

pub mod config;
pub mod core;
pub mod error;
pub mod helpers;

pub use crate::config::Config;
pub use crate::core::backend::{Backend, LiveBackend};
pub use crate::core::manifest::{FileSource, ManifestEntry, PostProcess, RepoSource, Source};
pub use crate::core::orchestrator::{Bootstrapper, LibraryFailure, RunReport, Selection, Stage};
pub use crate::core::output;
pub use crate::core::state::StateCache;
pub use crate::error::{BootstrapError, Result};
