#![allow(dead_code)]

use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};

use serde_json::json;
use solar_core::{InstallLayout, UpdaterConfig};
use solar_platform::AppPaths;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LATEST_PATH: &str = "/repos/randompixle/Solar-Neo/releases/latest";
pub const ASSET_PATH: &str = "/download/Solar-Neo_v0.7.zip";
pub const SNAPSHOT_PATH: &str = "/archive/refs/heads/main.zip";

pub struct Sandbox {
    pub temp: tempfile::TempDir,
    pub paths: AppPaths,
    pub layout: InstallLayout,
}

impl Sandbox {
    /// Sandbox with an installed package at `version` and a launcher.
    pub fn installed(version: &str) -> Self {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = AppPaths::rooted_at(temp.path());
        paths.ensure_dirs().expect("app dirs should be created");
        let layout = InstallLayout::from_paths(&paths);

        std::fs::create_dir_all(layout.package_dir.join("utils"))
            .expect("package dir should be created");
        std::fs::write(layout.package_dir.join("__main__.py"), "old")
            .expect("package file should be written");
        std::fs::write(layout.package_dir.join("utils").join("system.py"), "old utils")
            .expect("nested package file should be written");
        std::fs::write(user_marker(&paths), format!("{version}\n"))
            .expect("version marker should be written");
        std::fs::create_dir_all(&paths.bin_dir).expect("bin dir should be created");
        std::fs::write(paths.launcher(), "#!/bin/sh\n").expect("launcher should be written");

        Self {
            temp,
            paths,
            layout,
        }
    }

    pub fn audit_log(&self) -> String {
        std::fs::read_to_string(self.layout.audit_log_dir.join("update.log"))
            .expect("audit log should exist")
    }

    pub fn backup_slots(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.layout.backup_dir) {
            Ok(entries) => entries
                .map(|entry| entry.expect("backup entry should be readable").path())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn scratch_leftovers(&self) -> usize {
        std::fs::read_dir(&self.layout.scratch_root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_string_lossy()
                            .starts_with("solar-update-")
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    /// Installer that copies the bundled package into place and records
    /// `version` in the user marker.
    pub fn installer_script(&self, version: &str, exit_code: i32) -> String {
        format!(
            "#!/bin/sh\n\
             set -e\n\
             [ \"$SOLAR_UPDATING\" = 1 ]\n\
             mkdir -p \"{package}\"\n\
             cp -R solarneo/. \"{package}/\"\n\
             printf '{version}\\n' > \"{marker}\"\n\
             exit {exit_code}\n",
            package = self.layout.package_dir.display(),
            marker = user_marker(&self.paths).display(),
        )
    }
}

pub fn user_marker(paths: &AppPaths) -> PathBuf {
    paths.data_dir.join("version.txt")
}

pub fn config_for(server: &MockServer) -> UpdaterConfig {
    UpdaterConfig {
        api_url: server.uri(),
        fallback_url: Some(format!("{}{SNAPSHOT_PATH}", server.uri())),
        installer_shell: Some("sh".to_string()),
        http_timeout_secs: 5,
        download_timeout_secs: 30,
        ..UpdaterConfig::default()
    }
}

/// Release archive with a top-level folder, as GitHub produces them.
pub fn release_zip(installer: Option<&str>) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);

    writer
        .add_directory("Solar-Neo-0.7/", options)
        .expect("root entry should be written");
    writer
        .start_file("Solar-Neo-0.7/solarneo/__main__.py", options)
        .expect("package entry should be started");
    writer.write_all(b"new").expect("package entry should be written");
    if let Some(script) = installer {
        writer
            .start_file("Solar-Neo-0.7/install.sh", options)
            .expect("installer entry should be started");
        writer
            .write_all(script.as_bytes())
            .expect("installer entry should be written");
    }

    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

pub async fn mount_latest_release(server: &MockServer, tag: &str, digest: Option<&str>) {
    let mut asset = json!({
        "name": "Solar-Neo_v0.7.zip",
        "browser_download_url": format!("{}{ASSET_PATH}", server.uri()),
    });
    if let Some(digest) = digest {
        asset["digest"] = json!(digest);
    }

    Mock::given(method("GET"))
        .and(path(LATEST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": tag,
            "assets": [
                {
                    "name": "notes.txt",
                    "browser_download_url": format!("{}/download/notes.txt", server.uri())
                },
                asset,
            ],
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_asset(server: &MockServer, asset_path: &str, body: Vec<u8>, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(asset_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(expected_hits)
        .mount(server)
        .await;
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("file should be readable")
}
