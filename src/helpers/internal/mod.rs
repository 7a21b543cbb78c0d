//! Internal utility modules shared by the helpers

pub mod fs_utils;
pub mod hash;
pub mod progress;
pub mod url_utils;
