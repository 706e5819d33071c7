use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use solar_platform::{AppPaths, SYSTEM_DATA_DIR, SYSTEM_LAUNCHER};

#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl RemovalReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Paths removed by `solar uninstall-self`. Never includes the backup store
/// or the log directory.
#[must_use]
pub fn uninstall_targets(paths: &AppPaths) -> Vec<PathBuf> {
    let mut targets = vec![paths.launcher(), paths.alias_launcher(), paths.package_dir()];
    targets.extend(paths.version_markers().into_iter().take(1));
    targets.push(paths.config_dir.clone());
    targets.push(paths.cache_dir.clone());
    targets.push(PathBuf::from(SYSTEM_DATA_DIR));
    targets.push(PathBuf::from(SYSTEM_LAUNCHER));
    targets
}

/// Remove each path, file or directory, without stopping at the first
/// failure.
#[must_use]
pub fn remove_targets(targets: &[PathBuf]) -> RemovalReport {
    let mut report = RemovalReport::default();

    for target in targets {
        match remove_path(target) {
            Ok(true) => {
                debug!("Removed {}", target.display());
                report.removed.push(target.clone());
            }
            Ok(false) => report.missing.push(target.clone()),
            Err(error) => {
                warn!("Failed to remove {}: {error}", target.display());
                report.failed.push((target.clone(), error));
            }
        }
    }

    report
}

fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };

    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}
