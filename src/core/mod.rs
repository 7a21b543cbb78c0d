//! Manifest handling, state cache and the bootstrap loop

pub mod backend;
pub mod fallback;
pub mod lock;
pub mod manifest;
pub mod orchestrator;
pub mod output;
pub mod state;
