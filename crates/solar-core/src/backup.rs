//! Timestamp-named copies of previous installations.
//!
//! A slot is `<backup_dir>/<YYYYmmdd-HHMMSS>[-N]/` holding the copied tree
//! under `package/` and a `slot.json` manifest. The manifest is written last,
//! so a directory without one is an interrupted backup and is ignored.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

pub const MANIFEST_NAME: &str = "slot.json";
pub const PACKAGE_DIR_NAME: &str = "package";

const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Manifest {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("backup slot {name:?} not found")]
    NotFound { name: String },
    #[error("backup slot {name:?} is incomplete (no manifest)")]
    Incomplete { name: String },
    #[error("invalid backup slot name {name:?}")]
    InvalidName { name: String },
}

impl BackupError {
    fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &io::Error) -> Self {
        Self::io(
            context,
            io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotManifest {
    pub created_at: DateTime<Utc>,
    /// Version of the installation that was copied.
    pub version: String,
    /// Package directory the copy was taken from.
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSlot {
    pub name: String,
    pub path: PathBuf,
    pub manifest: SlotManifest,
}

impl BackupSlot {
    #[must_use]
    pub fn package_path(&self) -> PathBuf {
        self.path.join(PACKAGE_DIR_NAME)
    }
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `source` into a new slot.
    ///
    /// On failure the partially written slot is removed again.
    ///
    /// # Errors
    /// Returns an error when the store cannot be created, the tree cannot be
    /// copied, or the manifest cannot be written.
    pub fn create_slot(&self, source: &Path, version: &str) -> Result<BackupSlot, BackupError> {
        std::fs::create_dir_all(&self.root).map_err(|error| {
            BackupError::io_with_path("failed to create backup directory", &self.root, &error)
        })?;

        let created_at = Utc::now();
        let (name, path) = self.reserve_slot_dir(&created_at)?;
        let manifest = SlotManifest {
            created_at,
            version: version.to_string(),
            source: source.to_path_buf(),
        };

        if let Err(error) = populate_slot(&path, source, &manifest) {
            if let Err(cleanup) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to remove partial backup slot {}: {cleanup}",
                    path.display()
                );
            }
            return Err(error);
        }

        info!("Backup slot {name} created at {}", path.display());
        Ok(BackupSlot {
            name,
            path,
            manifest,
        })
    }

    fn reserve_slot_dir(
        &self,
        created_at: &DateTime<Utc>,
    ) -> Result<(String, PathBuf), BackupError> {
        let base = created_at
            .with_timezone(&chrono::Local)
            .format("%Y%m%d-%H%M%S")
            .to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.root.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok((name, path)),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
                Err(error) => {
                    return Err(BackupError::io_with_path(
                        "failed to create backup slot",
                        &path,
                        &error,
                    ));
                }
            }
        }

        Err(BackupError::io(
            "failed to allocate backup slot name",
            io::Error::new(io::ErrorKind::AlreadyExists, base),
        ))
    }

    /// Complete slots, newest first.
    ///
    /// # Errors
    /// Returns an error when the store directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<BackupSlot>, BackupError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(BackupError::io_with_path(
                    "failed to read backup directory",
                    &self.root,
                    &error,
                ));
            }
        };

        let mut slots: Vec<BackupSlot> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let path = entry.path();
                match read_manifest(&path) {
                    Ok(manifest) => Some(BackupSlot {
                        name,
                        path,
                        manifest,
                    }),
                    Err(error) => {
                        debug!("Skipping backup slot {name}: {error}");
                        None
                    }
                }
            })
            .collect();

        slots.sort_by(|a, b| {
            b.manifest
                .created_at
                .cmp(&a.manifest.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(slots)
    }

    /// # Errors
    /// Returns an error when the name is not a plain slot name, the slot does
    /// not exist, or its manifest is missing or unreadable.
    pub fn find(&self, name: &str) -> Result<BackupSlot, BackupError> {
        validate_slot_name(name)?;
        let path = self.root.join(name);
        if !path.is_dir() {
            return Err(BackupError::NotFound {
                name: name.to_string(),
            });
        }
        let manifest = read_manifest(&path).map_err(|_| BackupError::Incomplete {
            name: name.to_string(),
        })?;
        Ok(BackupSlot {
            name: name.to_string(),
            path,
            manifest,
        })
    }

    /// Replace `package_dir` with the contents of slot `name`.
    ///
    /// The slot is copied next to `package_dir` first and swapped in with a
    /// rename, so a failed copy leaves the current installation in place.
    ///
    /// # Errors
    /// Returns an error when the slot cannot be found or any copy, removal or
    /// rename fails.
    pub fn restore(&self, name: &str, package_dir: &Path) -> Result<BackupSlot, BackupError> {
        let slot = self.find(name)?;
        let staging = staging_path(package_dir, &slot.name);

        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|error| {
                BackupError::io_with_path(
                    "failed to clear restore staging directory",
                    &staging,
                    &error,
                )
            })?;
        }

        if let Err(error) = copy_dir_recursive(&slot.package_path(), &staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(error);
        }

        if package_dir.exists() {
            std::fs::remove_dir_all(package_dir).map_err(|error| {
                BackupError::io_with_path("failed to remove current package", package_dir, &error)
            })?;
        }
        std::fs::rename(&staging, package_dir).map_err(|error| {
            BackupError::io_with_path(
                "failed to move restored package into place",
                package_dir,
                &error,
            )
        })?;

        info!("Restored backup slot {} into {}", slot.name, package_dir.display());
        Ok(slot)
    }

    /// Remove complete slots beyond the newest `keep`. The slot named
    /// `protect` is always kept and counts toward `keep`.
    ///
    /// Individual removal failures are logged and skipped. Returns the names
    /// of the removed slots.
    ///
    /// # Errors
    /// Returns an error when the store directory cannot be read.
    pub fn prune(&self, keep: usize, protect: Option<&str>) -> Result<Vec<String>, BackupError> {
        let slots = self.list()?;
        let mut kept = 0;
        let mut removed = Vec::new();

        for slot in slots {
            if protect == Some(slot.name.as_str()) || kept < keep {
                kept += 1;
                continue;
            }
            match std::fs::remove_dir_all(&slot.path) {
                Ok(()) => {
                    debug!("Pruned backup slot {}", slot.name);
                    removed.push(slot.name);
                }
                Err(error) => warn!("Failed to prune backup slot {}: {error}", slot.name),
            }
        }

        Ok(removed)
    }
}

fn populate_slot(
    slot_dir: &Path,
    source: &Path,
    manifest: &SlotManifest,
) -> Result<(), BackupError> {
    let files = copy_dir_recursive(source, &slot_dir.join(PACKAGE_DIR_NAME))?;
    debug!("Copied {files} files into {}", slot_dir.display());

    let manifest_json = serde_json::to_string_pretty(manifest)
        .map_err(|source| BackupError::Manifest {
            context: "failed to serialize backup manifest",
            source,
        })?;
    let manifest_path = slot_dir.join(MANIFEST_NAME);
    std::fs::write(&manifest_path, manifest_json).map_err(|error| {
        BackupError::io_with_path("failed to write backup manifest", &manifest_path, &error)
    })
}

fn read_manifest(slot_dir: &Path) -> Result<SlotManifest, BackupError> {
    let path = slot_dir.join(MANIFEST_NAME);
    let content = std::fs::read_to_string(&path).map_err(|error| {
        BackupError::io_with_path("failed to read backup manifest", &path, &error)
    })?;
    serde_json::from_str(&content).map_err(|source| BackupError::Manifest {
        context: "failed to parse backup manifest",
        source,
    })
}

fn validate_slot_name(name: &str) -> Result<(), BackupError> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if plain {
        Ok(())
    } else {
        Err(BackupError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn staging_path(package_dir: &Path, slot_name: &str) -> PathBuf {
    let staging_name = format!(".solar-restore-{slot_name}");
    match package_dir.parent() {
        Some(parent) => parent.join(staging_name),
        None => PathBuf::from(staging_name),
    }
}

/// Copy the tree at `src` into `dest`, returning the number of files copied.
/// Symlinks are recreated rather than followed on Unix.
pub(crate) fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<u64, BackupError> {
    let mut files = 0;

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|error| {
            BackupError::io("failed to walk directory tree", io::Error::from(error))
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|error| {
                BackupError::io_with_path("failed to create directory", &target, &error)
            })?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|error| {
                BackupError::io(
                    "failed to copy file",
                    io::Error::new(
                        error.kind(),
                        format!("{} -> {}: {error}", entry.path().display(), target.display()),
                    ),
                )
            })?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), BackupError> {
    let link_target = std::fs::read_link(src)
        .map_err(|error| BackupError::io_with_path("failed to read symlink", src, &error))?;
    std::os::unix::fs::symlink(&link_target, dest)
        .map_err(|error| BackupError::io_with_path("failed to create symlink", dest, &error))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), BackupError> {
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|error| BackupError::io_with_path("failed to copy symlink target", src, &error))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{BackupError, BackupStore, MANIFEST_NAME, copy_dir_recursive};

    fn write_package(dir: &Path, marker: &str) {
        std::fs::create_dir_all(dir.join("lib")).expect("package tree should be created");
        std::fs::write(dir.join("__main__.py"), marker).expect("package file should be written");
        std::fs::write(dir.join("lib").join("core.py"), "core")
            .expect("nested file should be written");
    }

    #[test]
    fn create_slot_copies_tree_and_writes_manifest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let package = temp.path().join("solarneo");
        write_package(&package, "v0.6");
        let store = BackupStore::new(temp.path().join("backups"));

        let slot = store
            .create_slot(&package, "0.6.0")
            .expect("backup slot should be created");

        assert!(slot.path.join(MANIFEST_NAME).is_file());
        assert_eq!(slot.manifest.version, "0.6.0");
        assert_eq!(
            std::fs::read_to_string(slot.package_path().join("lib").join("core.py"))
                .expect("copied file should be readable"),
            "core"
        );
        assert_eq!(slot.name.len(), "20260101-000000".len());
    }

    #[test]
    fn slots_created_in_the_same_second_get_distinct_names() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let package = temp.path().join("solarneo");
        write_package(&package, "v0.6");
        let store = BackupStore::new(temp.path().join("backups"));

        let first = store.create_slot(&package, "0.6.0").expect("first slot");
        let second = store.create_slot(&package, "0.6.0").expect("second slot");

        assert_ne!(first.name, second.name);
        assert_eq!(store.list().expect("slots should list").len(), 2);
    }

    #[test]
    fn failed_copy_removes_partial_slot() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = BackupStore::new(temp.path().join("backups"));

        let result = store.create_slot(&temp.path().join("missing"), "0.6.0");

        assert!(matches!(result, Err(BackupError::Io { .. })));
        let leftovers = std::fs::read_dir(store.root())
            .expect("backup root should exist")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn list_skips_incomplete_slots() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let package = temp.path().join("solarneo");
        write_package(&package, "v0.6");
        let store = BackupStore::new(temp.path().join("backups"));
        let slot = store.create_slot(&package, "0.6.0").expect("slot should be created");
        std::fs::create_dir_all(store.root().join("20000101-000000").join("package"))
            .expect("incomplete slot should be created");

        let slots = store.list().expect("slots should list");

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, slot.name);
        assert!(matches!(
            store.find("20000101-000000"),
            Err(BackupError::Incomplete { .. })
        ));
    }

    #[test]
    fn list_of_missing_store_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = BackupStore::new(temp.path().join("never-created"));

        assert!(store.list().expect("missing store should list").is_empty());
    }

    #[test]
    fn restore_replaces_package_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let package = temp.path().join("solarneo");
        write_package(&package, "v0.6");
        let store = BackupStore::new(temp.path().join("backups"));
        let slot = store.create_slot(&package, "0.6.0").expect("slot should be created");

        std::fs::remove_dir_all(&package).expect("package should be removed");
        std::fs::create_dir_all(&package).expect("package dir should be recreated");
        std::fs::write(package.join("broken.txt"), "half installed")
            .expect("broken file should be written");

        store.restore(&slot.name, &package).expect("restore should succeed");

        assert!(!package.join("broken.txt").exists());
        assert_eq!(
            std::fs::read_to_string(package.join("__main__.py")).expect("restored file"),
            "v0.6"
        );
        assert!(slot.package_path().is_dir(), "slot should survive restore");
    }

    #[test]
    fn restore_rejects_path_like_names() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = BackupStore::new(temp.path().join("backups"));

        for name in ["..", "../etc", "a/b", ""] {
            assert!(
                matches!(
                    store.restore(name, &temp.path().join("pkg")),
                    Err(BackupError::InvalidName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
        assert!(matches!(
            store.restore("20990101-000000", &temp.path().join("pkg")),
            Err(BackupError::NotFound { .. })
        ));
    }

    #[test]
    fn prune_keeps_newest_and_protected_slots() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let package = temp.path().join("solarneo");
        write_package(&package, "v0.6");
        let store = BackupStore::new(temp.path().join("backups"));
        let oldest = store.create_slot(&package, "0.4.0").expect("slot");
        let _middle = store.create_slot(&package, "0.5.0").expect("slot");
        let newest = store.create_slot(&package, "0.6.0").expect("slot");

        let removed = store
            .prune(1, Some(&oldest.name))
            .expect("prune should succeed");

        assert_eq!(removed.len(), 1);
        let remaining: Vec<String> = store
            .list()
            .expect("slots should list")
            .into_iter()
            .map(|slot| slot.name)
            .collect();
        assert!(remaining.contains(&oldest.name));
        assert!(remaining.contains(&newest.name));
    }

    #[cfg(unix)]
    #[test]
    fn copy_preserves_symlinks_and_modes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).expect("src should be created");
        let script = src.join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").expect("script should be written");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("mode should be set");
        std::os::unix::fs::symlink("run.sh", src.join("run")).expect("symlink should be created");

        let files = copy_dir_recursive(&src, &temp.path().join("dest")).expect("copy should work");

        assert_eq!(files, 1);
        let dest = temp.path().join("dest");
        let mode = std::fs::metadata(dest.join("run.sh"))
            .expect("copied script metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            std::fs::read_link(dest.join("run")).expect("symlink should be copied"),
            Path::new("run.sh")
        );
    }
}
