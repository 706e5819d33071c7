use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR_NAME: &str = "solarneo";

/// System-wide data directory used by root installs.
pub const SYSTEM_DATA_DIR: &str = "/usr/local/share/solarneo";

/// System-wide launcher location used by root installs.
pub const SYSTEM_LAUNCHER: &str = "/usr/local/bin/solar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub bin_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/cache/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;

        #[cfg(target_os = "macos")]
        {
            Ok(Self {
                config_dir: home.join("Library/Application Support/solarneo"),
                cache_dir: home.join("Library/Caches/solarneo"),
                data_dir: home.join("Library/Application Support/solarneo"),
                bin_dir: home.join(".local/bin"),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR_NAME),
                cache_dir: dirs::cache_dir()
                    .ok_or(AppPathsError::CacheDirUnavailable)?
                    .join(APP_DIR_NAME),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR_NAME),
                bin_dir: home.join(".local").join("bin"),
            })
        }
    }

    /// Build paths rooted at an arbitrary directory. Used for portable
    /// installs and by tests that must not touch the real home directory.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
            bin_dir: root.join("bin"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Directory holding `update.log` and its rotated generations.
    #[must_use]
    pub fn audit_log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    #[must_use]
    pub fn package_dir(&self) -> PathBuf {
        self.data_dir.join(APP_DIR_NAME)
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    #[must_use]
    pub fn update_lock_file(&self) -> PathBuf {
        self.data_dir.join("update.lock")
    }

    #[must_use]
    pub fn launcher(&self) -> PathBuf {
        self.bin_dir.join("solar")
    }

    /// Short `sln` alias installed next to the launcher.
    #[must_use]
    pub fn alias_launcher(&self) -> PathBuf {
        self.bin_dir.join("sln")
    }

    /// Installed-version marker files, user-scoped first.
    #[must_use]
    pub fn version_markers(&self) -> Vec<PathBuf> {
        vec![
            self.data_dir.join("version.txt"),
            Path::new(SYSTEM_DATA_DIR).join("version.txt"),
        ]
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
