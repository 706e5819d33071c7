//! Append-only, rotating update log.
//!
//! Each update run rotates `update.log` into numbered generations and then
//! appends one line per event. Writing is best-effort: the first failure is
//! reported through the `log` facade and the run carries on.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const ACTIVE_LOG_NAME: &str = "update.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl AuditLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }

    fn log_level(self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
        }
    }
}

#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    write_failed: AtomicBool,
}

impl AuditLog {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_failed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_LOG_NAME)
    }

    /// Path of generation `k`; generation 0 is the active file.
    #[must_use]
    pub fn generation_path(&self, generation: usize) -> PathBuf {
        if generation == 0 {
            self.active_path()
        } else {
            self.dir.join(format!("update.{generation}.log"))
        }
    }

    /// Whether any write to the log has failed during this process.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.write_failed.load(Ordering::Relaxed)
    }

    /// Shift every generation up by one, evicting generation
    /// `max_generations`, so the next [`record`](Self::record) starts a fresh
    /// active file.
    pub fn rotate(&self, max_generations: usize) {
        if let Err(error) = self.try_rotate(max_generations) {
            self.report_failure("rotate", &error);
        }
    }

    fn try_rotate(&self, max_generations: usize) -> io::Result<()> {
        remove_if_exists(&self.generation_path(max_generations))?;
        for generation in (0..max_generations).rev() {
            let src = self.generation_path(generation);
            if src.exists() {
                std::fs::rename(&src, self.generation_path(generation + 1))?;
            }
        }
        Ok(())
    }

    /// Append `[timestamp] LEVEL message` to the active file.
    pub fn record(&self, level: AuditLevel, message: impl AsRef<str>) {
        let message = single_line(message.as_ref());
        log::log!(level.log_level(), "{message}");

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] {} {message}\n", level.as_str());
        if let Err(error) = self.append(&line) {
            self.report_failure("write", &error);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(AuditLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(AuditLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(AuditLevel::Error, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.record(AuditLevel::Debug, message);
    }

    fn append(&self, line: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        file.write_all(line.as_bytes())
    }

    fn report_failure(&self, action: &str, error: &io::Error) {
        if !self.write_failed.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Update log {action} failed in {}: {error}; continuing without audit log",
                self.dir.display()
            );
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

fn single_line(message: &str) -> String {
    message.trim_end().replace(['\r', '\n'], " ")
}
