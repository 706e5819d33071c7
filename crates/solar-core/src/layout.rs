use std::path::{Path, PathBuf};

use log::debug;
use solar_platform::AppPaths;

/// Filesystem locations an update run reads from and writes to.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    /// Installed package tree replaced by an update.
    pub package_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub audit_log_dir: PathBuf,
    /// Parent of per-run scratch directories.
    pub scratch_root: PathBuf,
    pub lock_file: PathBuf,
    /// Installed-version marker files in priority order.
    pub version_markers: Vec<PathBuf>,
    /// Ancillary install state cleared before the installer runs.
    pub ancillary_paths: Vec<PathBuf>,
}

impl InstallLayout {
    #[must_use]
    pub fn from_paths(paths: &AppPaths) -> Self {
        Self {
            package_dir: paths.package_dir(),
            backup_dir: paths.backup_dir(),
            audit_log_dir: paths.audit_log_dir(),
            scratch_root: paths.cache_dir.clone(),
            lock_file: paths.update_lock_file(),
            version_markers: paths.version_markers(),
            ancillary_paths: vec![paths.launcher()],
        }
    }

    /// Version string of the current installation.
    ///
    /// Reads the first non-empty marker file and falls back to the supplied
    /// version (normally the one compiled into the running binary).
    #[must_use]
    pub fn installed_version(&self, fallback: &str) -> String {
        read_installed_version(&self.version_markers, fallback)
    }
}

#[must_use]
pub fn read_installed_version(candidates: &[PathBuf], fallback: &str) -> String {
    candidates
        .iter()
        .find_map(|path| read_marker(path))
        .unwrap_or_else(|| fallback.to_string())
}

fn read_marker(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let version = content.trim();
            (!version.is_empty()).then(|| version.to_string())
        }
        Err(error) => {
            debug!("Ignoring unreadable version marker {}: {error}", path.display());
            None
        }
    }
}
