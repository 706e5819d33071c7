//! One self-update run, from reentrancy check to verified installation.
//!
//! Every phase transition is written to the audit log. The scratch directory
//! is a [`tempfile::TempDir`] and is removed when the run returns, whatever
//! the outcome. The backup store is only written in `BackingUp` and pruned
//! after a verified success.

use std::fmt;
use std::path::PathBuf;

use log::debug;

use crate::artifact::{download_file, extract_zip, file_name_from_url, verify_sha256};
use crate::audit::AuditLog;
use crate::backup::BackupStore;
use crate::config::UpdaterConfig;
use crate::error::{RecoveryHint, UpdateError};
use crate::guard::{GuardError, RunContext, UpdateGuard};
use crate::installer::{locate_installer, mark_executable, run_installer, run_uninstall_command};
use crate::layout::InstallLayout;
use crate::release::{ReleaseInfo, ReleaseLocator};
use crate::uninstall::remove_targets;
use crate::version::{Comparison, compare};

const SCRATCH_PREFIX: &str = "solar-update-";
const EXTRACT_DIR_NAME: &str = "extracted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CheckingReentrancy,
    LocatingRelease,
    ComparingVersions,
    Downloading,
    Extracting,
    LocatingInstaller,
    BackingUp,
    Replacing,
    RunningInstaller,
    Verifying,
    Succeeded,
    Failed,
    Done,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CheckingReentrancy => "CheckingReentrancy",
            Self::LocatingRelease => "LocatingRelease",
            Self::ComparingVersions => "ComparingVersions",
            Self::Downloading => "Downloading",
            Self::Extracting => "Extracting",
            Self::LocatingInstaller => "LocatingInstaller",
            Self::BackingUp => "BackingUp",
            Self::Replacing => "Replacing",
            Self::RunningInstaller => "RunningInstaller",
            Self::Verifying => "Verifying",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The guard variable was set, or another process holds the update lock.
    Reentrant { holder: Option<u32> },
}

#[derive(Debug)]
pub enum UpdateOutcome {
    UpToDate {
        installed: String,
        latest: String,
    },
    /// The installer succeeded; safe to relaunch.
    Updated {
        from: String,
        to: String,
        backup: Option<PathBuf>,
        source_fallback: bool,
    },
    Failed(UpdateError),
    Aborted(AbortReason),
}

impl UpdateOutcome {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UpToDate { .. } | Self::Updated { .. } | Self::Aborted(_) => 0,
            Self::Failed(error) => error.exit_code(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::UpToDate { .. } | Self::Updated { .. })
    }
}

#[derive(Debug)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    /// Phases entered, in order.
    pub phases: Vec<Phase>,
}

struct PhaseTracker<'a> {
    audit: &'a AuditLog,
    phases: Vec<Phase>,
}

impl<'a> PhaseTracker<'a> {
    fn new(audit: &'a AuditLog) -> Self {
        Self {
            audit,
            phases: vec![Phase::Idle],
        }
    }

    fn enter(&mut self, phase: Phase) {
        let previous = self.phases.last().copied().unwrap_or(Phase::Idle);
        self.audit.info(format!("Phase {previous} -> {phase}"));
        self.phases.push(phase);
    }
}

pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    layout: InstallLayout,
    fallback_version: String,
    client: reqwest::Client,
    audit: AuditLog,
}

impl UpdateOrchestrator {
    /// `fallback_version` is reported as the installed version when no
    /// version marker exists.
    ///
    /// # Errors
    /// Returns [`UpdateError::Network`] when the HTTP client cannot be built.
    pub fn new(
        config: UpdaterConfig,
        layout: InstallLayout,
        fallback_version: impl Into<String>,
    ) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.http_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|error| UpdateError::network("failed to build HTTP client", error))?;
        let audit = AuditLog::new(&layout.audit_log_dir);

        Ok(Self {
            config,
            layout,
            fallback_version: fallback_version.into(),
            client,
            audit,
        })
    }

    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    #[must_use]
    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub async fn run(&self, context: &RunContext) -> UpdateReport {
        self.audit.rotate(self.config.max_log_generations);
        self.audit.info(format!(
            "Self-update started (force: {})",
            if context.force { "yes" } else { "no" }
        ));

        let mut tracker = PhaseTracker::new(&self.audit);
        let outcome = match self.execute(context, &mut tracker).await {
            Ok(outcome) => outcome,
            Err(error) => UpdateOutcome::Failed(error),
        };

        match &outcome {
            UpdateOutcome::UpToDate { .. } | UpdateOutcome::Updated { .. } => {
                tracker.enter(Phase::Succeeded);
            }
            UpdateOutcome::Failed(error) => {
                tracker.enter(Phase::Failed);
                self.audit.error(format!("Update failed: {error}"));
                if error.is_destructive() {
                    self.audit.error(match error.backup() {
                        Some(slot) => format!(
                            "Installation was modified; restore it from {}",
                            slot.display()
                        ),
                        None => "Installation was modified and no backup exists".to_string(),
                    });
                }
            }
            UpdateOutcome::Aborted(_) => {}
        }
        tracker.enter(Phase::Done);

        UpdateReport {
            outcome,
            phases: tracker.phases,
        }
    }

    async fn execute(
        &self,
        context: &RunContext,
        tracker: &mut PhaseTracker<'_>,
    ) -> Result<UpdateOutcome, UpdateError> {
        tracker.enter(Phase::CheckingReentrancy);
        if context.guard_active {
            self.audit.warn(format!(
                "{} is set; an update is already in progress, aborting",
                self.config.guard_env
            ));
            return Ok(UpdateOutcome::Aborted(AbortReason::Reentrant { holder: None }));
        }
        let guard = match UpdateGuard::acquire(&self.layout.lock_file) {
            Ok(guard) => Some(guard),
            Err(GuardError::AlreadyRunning { holder }) => {
                self.audit.warn(match holder {
                    Some(pid) => format!("Another update is running (pid {pid}), aborting"),
                    None => "Another update is running, aborting".to_string(),
                });
                return Ok(UpdateOutcome::Aborted(AbortReason::Reentrant { holder }));
            }
            Err(error) => {
                self.audit.warn(format!("Update lock unavailable, continuing without it: {error}"));
                None
            }
        };
        if guard.is_some() {
            self.clean_stale_scratch();
        }

        let current = self.layout.installed_version(&self.fallback_version);
        self.audit.info(format!("Installed version: {current}"));

        tracker.enter(Phase::LocatingRelease);
        let release = self.locate_release(&current).await;

        tracker.enter(Phase::ComparingVersions);
        if let Some(outcome) = self.compare_versions(&current, &release, context.force) {
            return Ok(outcome);
        }

        std::fs::create_dir_all(&self.layout.scratch_root)
            .map_err(|error| UpdateError::io("failed to create cache directory", error))?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.layout.scratch_root)
            .map_err(|error| UpdateError::io("failed to create scratch directory", error))?;
        debug!("Scratch directory: {}", scratch.path().display());

        tracker.enter(Phase::Downloading);
        let archive = scratch.path().join(file_name_from_url(&release.asset_url));
        self.audit.info(format!("Downloading {}", release.asset_url));
        let bytes = download_file(
            &self.client,
            &release.asset_url,
            &archive,
            self.config.download_timeout(),
        )
        .await
        .map_err(UpdateError::Download)?;
        if let Some(expected) = &release.asset_sha256 {
            verify_sha256(&archive, expected).map_err(UpdateError::Download)?;
            self.audit.info("Checksum verified");
        }
        self.audit.info(format!("Downloaded {bytes} bytes"));

        tracker.enter(Phase::Extracting);
        let extracted = scratch.path().join(EXTRACT_DIR_NAME);
        let files = extract_zip(&archive, &extracted).map_err(UpdateError::Extract)?;
        self.audit.info(format!("Extracted {files} files"));

        tracker.enter(Phase::LocatingInstaller);
        let installer = locate_installer(&extracted, &self.config.installer_name).ok_or_else(|| {
            UpdateError::InstallerMissing {
                name: self.config.installer_name.clone(),
            }
        })?;
        self.audit.info(format!("Installer found at {}", installer.display()));

        tracker.enter(Phase::BackingUp);
        let store = BackupStore::new(&self.layout.backup_dir);
        let backup = if self.layout.package_dir.exists() {
            let slot = store
                .create_slot(&self.layout.package_dir, &current)
                .map_err(UpdateError::Backup)?;
            self.audit.info(format!("Backup created at {}", slot.path.display()));
            Some(slot)
        } else {
            self.audit.warn(format!(
                "No installed package at {}; nothing to back up",
                self.layout.package_dir.display()
            ));
            None
        };
        let hint = RecoveryHint(backup.as_ref().map(|slot| slot.path.clone()));

        tracker.enter(Phase::Replacing);
        if self.layout.package_dir.exists() {
            self.audit.info(format!(
                "Removing installed package {}",
                self.layout.package_dir.display()
            ));
            std::fs::remove_dir_all(&self.layout.package_dir).map_err(|source| {
                UpdateError::Replace {
                    source,
                    hint: hint.clone(),
                }
            })?;
        }
        self.clear_ancillary_state().await;
        mark_executable(&installer).map_err(|source| UpdateError::Replace {
            source,
            hint: hint.clone(),
        })?;

        tracker.enter(Phase::RunningInstaller);
        run_installer(
            &installer,
            self.config.installer_shell.as_deref(),
            &self.config.guard_env,
        )
        .await
        .map_err(|source| UpdateError::Installer {
            source,
            hint: hint.clone(),
        })?;
        self.audit.info("Installer finished");

        tracker.enter(Phase::Verifying);
        let installed = self.layout.installed_version(&release.tag);
        self.audit.info(format!("Updated from {current} to {installed}"));
        if let Some(keep) = self.config.keep_backups {
            let protect = backup.as_ref().map(|slot| slot.name.as_str());
            match store.prune(keep, protect) {
                Ok(removed) if !removed.is_empty() => {
                    self.audit.info(format!("Pruned backup slots: {}", removed.join(", ")));
                }
                Ok(_) => {}
                Err(error) => self.audit.warn(format!("Backup pruning failed: {error}")),
            }
        }

        Ok(UpdateOutcome::Updated {
            from: current,
            to: installed,
            backup: backup.map(|slot| slot.path),
            source_fallback: release.is_source_fallback,
        })
    }

    async fn locate_release(&self, current: &str) -> ReleaseInfo {
        let locator = ReleaseLocator::new(&self.client, &self.config);
        let release = match locator.locate(current).await {
            Ok(release) => release,
            Err(error) => {
                self.audit.warn(format!(
                    "Release lookup failed, using source snapshot: {error}"
                ));
                ReleaseInfo::source_fallback(current, None, &self.config)
            }
        };

        if release.is_source_fallback {
            self.audit.info(format!(
                "Using source snapshot {} (tag {})",
                release.asset_url, release.tag
            ));
        } else {
            self.audit.info(format!(
                "Latest release {} provides {}",
                release.tag,
                release.asset_name.as_deref().unwrap_or(&release.asset_url)
            ));
        }
        release
    }

    /// `Some` when the run should stop here.
    fn compare_versions(
        &self,
        current: &str,
        release: &ReleaseInfo,
        force: bool,
    ) -> Option<UpdateOutcome> {
        if force {
            self.audit.warn("Force mode enabled; installing regardless of version ordering");
        }
        if release.is_source_fallback {
            self.audit.info("Source snapshot has no comparable version; proceeding");
            return None;
        }
        if release.tag_is_synthetic {
            self.audit.warn("Release has no tag; skipping version comparison");
            return None;
        }

        match compare(current, &release.tag) {
            Comparison::Less => {
                self.audit.info(format!("Update available: {current} -> {}", release.tag));
                None
            }
            Comparison::Equal | Comparison::Greater if force => {
                self.audit.info(format!(
                    "Installed {current} is not older than {}; forcing update",
                    release.tag
                ));
                None
            }
            Comparison::Equal | Comparison::Greater => {
                self.audit.info(format!(
                    "Already up to date ({current}, latest {})",
                    release.tag
                ));
                Some(UpdateOutcome::UpToDate {
                    installed: current.to_string(),
                    latest: release.tag.clone(),
                })
            }
            Comparison::Incomparable => {
                self.audit.warn(format!(
                    "Cannot compare versions {current:?} and {:?}; proceeding",
                    release.tag
                ));
                None
            }
        }
    }

    async fn clear_ancillary_state(&self) {
        if let Some(argv) = &self.config.uninstall_command {
            self.audit.info(format!("Running uninstall command: {}", argv.join(" ")));
            if let Err(error) = run_uninstall_command(argv, &self.config.guard_env).await {
                self.audit.warn(format!("Uninstall command failed, continuing: {error}"));
            }
            return;
        }

        let report = remove_targets(&self.layout.ancillary_paths);
        for path in &report.removed {
            self.audit.info(format!("Removed {}", path.display()));
        }
        for (path, error) in &report.failed {
            self.audit.warn(format!("Could not remove {}: {error}", path.display()));
        }
    }

    fn clean_stale_scratch(&self) {
        let Ok(entries) = std::fs::read_dir(&self.layout.scratch_root) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let is_scratch = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
            if !is_scratch || !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!("Removed stale scratch directory {}", entry.path().display()),
                Err(error) => debug!(
                    "Failed to remove stale scratch directory {}: {error}",
                    entry.path().display()
                ),
            }
        }
    }
}
