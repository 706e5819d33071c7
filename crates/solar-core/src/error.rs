use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::backup::BackupError;
use crate::installer::InstallerError;

/// Where the previous installation can be recovered from, if a backup was
/// taken before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryHint(pub Option<PathBuf>);

impl fmt::Display for RecoveryHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(path) => write!(f, " (previous installation backed up at {})", path.display()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed: {0}")]
    Download(#[source] ArtifactError),
    #[error("failed to extract update archive: {0}")]
    Extract(#[source] ArtifactError),
    #[error("{name} not found in the downloaded archive")]
    InstallerMissing { name: String },
    #[error("failed to back up the current installation: {0}")]
    Backup(#[source] BackupError),
    #[error("failed to remove the installed package{hint}: {source}")]
    Replace {
        #[source]
        source: std::io::Error,
        hint: RecoveryHint,
    },
    #[error("{source}{hint}")]
    Installer {
        #[source]
        source: InstallerError,
        hint: RecoveryHint,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn network(context: &'static str, source: reqwest::Error) -> Self {
        Self::Network { context, source }
    }

    /// The installed package was already modified when the error happened.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Replace { .. } | Self::Installer { .. })
    }

    /// Backup slot holding the previous installation, for destructive
    /// failures.
    #[must_use]
    pub fn backup(&self) -> Option<&Path> {
        match self {
            Self::Replace { hint, .. } | Self::Installer { hint, .. } => hint.0.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Installer { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}
