//! Leaf helpers used by the acquisition backends and the orchestrator
//!
//! - **acquire**: downloads into the archive cache, VCS checkouts
//! - **build**: archive extraction, repository snapshots
//! - **postprocess**: patch application, scripts
//! - **cmd** / **tools**: running and locating external executables

pub mod acquire;
pub mod build;
pub mod cmd;
pub mod internal;
pub mod postprocess;
pub mod tools;
