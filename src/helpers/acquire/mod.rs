//! Getting library sources
//!
//! - **download**: HTTP(S) and `file://` downloads into the archive cache
//! - **vcs**: git/hg/svn clone and update

pub mod download;
pub mod vcs;

pub use download::Download;
pub use vcs::{VcsKind, VcsSync};
