use std::path::Path;

use serde::{Deserialize, Serialize};
use solar_core::UpdaterConfig;
use solar_platform::AppPaths;

pub const DEBUG_ENV: &str = "SOLAR_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    /// Start the freshly installed `solar` after a successful self-update.
    #[serde(default = "default_true")]
    pub relaunch_after_update: bool,

    #[serde(default)]
    pub update: UpdaterConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            relaunch_after_update: true,
            update: UpdaterConfig::default(),
        }
    }
}

impl AppSettings {
    /// Writes a default `settings.json` on first use so there is a file to
    /// edit.
    pub fn load(paths: &AppPaths) -> Self {
        let settings_path = paths.settings_file();
        if settings_path.exists() {
            return Self::load_from(&settings_path);
        }

        let settings = Self::default();
        if let Err(error) = settings.save(paths) {
            log::debug!("Could not write default settings: {error}");
        }
        settings
    }

    /// Missing, unreadable or invalid files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring invalid settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;
        self.save_to(&paths.settings_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// Debug logging is on when configured or when `SOLAR_DEBUG=1`.
    pub fn debug_enabled(&self) -> bool {
        self.debug_logging || std::env::var_os(DEBUG_ENV).is_some_and(|value| value == "1")
    }
}
