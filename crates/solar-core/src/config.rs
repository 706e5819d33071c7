use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-product parameters of the self-updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// `owner/name` of the repository publishing releases.
    #[serde(default = "default_repo")]
    pub repo: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Unversioned snapshot used when no release artifact matches. Derived
    /// from `repo` when unset.
    #[serde(default)]
    pub fallback_url: Option<String>,

    /// Case-insensitive token an artifact name must contain.
    #[serde(default = "default_product_token")]
    pub product_token: String,

    #[serde(default = "default_asset_extension")]
    pub asset_extension: String,

    #[serde(default = "default_installer_name")]
    pub installer_name: String,

    /// Interpreter used to run the installer. The script is executed
    /// directly when unset or not found on `PATH`.
    #[serde(default = "default_installer_shell")]
    pub installer_shell: Option<String>,

    /// Command clearing ancillary install state before the installer runs,
    /// as `[program, args...]`. When unset the launcher files of the layout
    /// are removed in-process.
    #[serde(default)]
    pub uninstall_command: Option<Vec<String>>,

    /// Environment variable marking an update in progress.
    #[serde(default = "default_guard_env")]
    pub guard_env: String,

    #[serde(default = "default_max_log_generations")]
    pub max_log_generations: usize,

    /// Number of backup slots kept after a successful update. `None` keeps
    /// every slot.
    #[serde(default)]
    pub keep_backups: Option<usize>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_repo() -> String {
    "randompixle/Solar-Neo".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_product_token() -> String {
    "solar-neo".to_string()
}

fn default_asset_extension() -> String {
    ".zip".to_string()
}

fn default_installer_name() -> String {
    "install.sh".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_installer_shell() -> Option<String> {
    Some("bash".to_string())
}

fn default_guard_env() -> String {
    "SOLAR_UPDATING".to_string()
}

fn default_max_log_generations() -> usize {
    5
}

fn default_http_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    300
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            api_url: default_api_url(),
            fallback_url: None,
            product_token: default_product_token(),
            asset_extension: default_asset_extension(),
            installer_name: default_installer_name(),
            installer_shell: default_installer_shell(),
            uninstall_command: None,
            guard_env: default_guard_env(),
            max_log_generations: default_max_log_generations(),
            keep_backups: None,
            http_timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
            user_agent: None,
        }
    }
}

impl UpdaterConfig {
    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_url.trim_end_matches('/'),
            self.repo
        )
    }

    #[must_use]
    pub fn fallback_url(&self) -> String {
        self.fallback_url.clone().unwrap_or_else(|| {
            format!(
                "https://github.com/{}/archive/refs/heads/main.zip",
                self.repo
            )
        })
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("solarneo/{}", env!("CARGO_PKG_VERSION")))
    }
}
