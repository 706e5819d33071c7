//! Self-update engine for Solar Neo.
//!
//! The pieces are independent of the command-line front end:
//! - Version parsing and comparison.
//! - Release lookup against a GitHub-style "latest release" endpoint.
//! - Artifact download, checksum verification and extraction.
//! - Timestamped backups of the installed package.
//! - The update state machine and its rotating audit log.

pub mod artifact;
pub mod audit;
pub mod backup;
mod config;
mod error;
pub mod guard;
pub mod installer;
mod layout;
pub mod orchestrator;
pub mod release;
pub mod uninstall;
mod version;

pub use audit::{AuditLevel, AuditLog};
pub use backup::{BackupError, BackupSlot, BackupStore, SlotManifest};
pub use config::UpdaterConfig;
pub use error::{RecoveryHint, UpdateError};
pub use guard::{GuardError, RunContext, UpdateGuard};
/// Installed package locations and version marker lookup.
pub use layout::{InstallLayout, read_installed_version};
pub use orchestrator::{AbortReason, Phase, UpdateOrchestrator, UpdateOutcome, UpdateReport};
pub use release::{LocateError, ReleaseInfo, ReleaseLocator};
pub use uninstall::{RemovalReport, remove_targets, uninstall_targets};
/// Version triple, parse errors and ordering helpers.
pub use version::{Comparison, Version, VersionParseError, compare};
