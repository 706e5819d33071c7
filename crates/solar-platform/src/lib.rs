//! Per-user filesystem layout for Solar Neo.

mod paths;

pub use paths::{AppPaths, AppPathsError, SYSTEM_DATA_DIR, SYSTEM_LAUNCHER};
