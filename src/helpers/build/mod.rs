//! Turning downloaded files into workspaces, and workspaces into snapshots
//!
//! - **extract**: zip, tar, tar.gz, tar.bz2, tar.xz, tar.zst
//! - **snapshot**: `.tar.gz` of a synced repository

pub mod extract;
pub mod snapshot;

pub use extract::{ArchiveFormat, Extractor};
pub use snapshot::{create_snapshot, snapshot_name};
