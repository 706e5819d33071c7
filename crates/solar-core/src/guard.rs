use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// Caller-provided view of the process environment for one update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Proceed even when the installed version is current or newer.
    pub force: bool,
    /// The guard variable was set when the process started.
    pub guard_active: bool,
}

impl RunContext {
    /// Reads `guard_env` once; only the value `1` marks an update in
    /// progress.
    #[must_use]
    pub fn from_env(guard_env: &str, force: bool) -> Self {
        Self {
            force,
            guard_active: std::env::var_os(guard_env).is_some_and(|value| value == "1"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("another update is already running")]
    AlreadyRunning { holder: Option<u32> },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl GuardError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Advisory per-user lock held for the duration of an update run.
#[derive(Debug)]
pub struct UpdateGuard {
    file: File,
    path: PathBuf,
}

impl UpdateGuard {
    /// # Errors
    /// Returns [`GuardError::AlreadyRunning`] when another process holds the
    /// lock, or [`GuardError::Io`] when the lock file cannot be used.
    pub fn acquire(lock_path: &Path) -> Result<Self, GuardError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| GuardError::io("failed to create lock directory", error))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|error| GuardError::io("failed to open update lock file", error))?;

        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(GuardError::AlreadyRunning {
                    holder: read_holder(&mut file),
                });
            }
            Err(error) => return Err(GuardError::io("failed to acquire update lock", error)),
        }

        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|error| GuardError::io("failed to write update lock metadata", error))?;

        debug!("Acquired update lock {}", lock_path.display());
        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        if let Err(error) = fs2::FileExt::unlock(&self.file) {
            debug!("Failed to release update lock {}: {error}", self.path.display());
        }
    }
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}
