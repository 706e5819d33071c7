use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("installer exited with code {code}")]
    Exit { code: i32 },
    #[error("installer was terminated by a signal")]
    Signaled,
}

impl InstallerError {
    /// Exit code to hand back to the shell.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Shallowest file named `name` below `root`.
#[must_use]
pub fn locate_installer(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .min_by_key(walkdir::DirEntry::depth)
        .map(walkdir::DirEntry::into_path)
}

/// # Errors
/// Returns an error when the file permissions cannot be changed.
#[cfg(unix)]
pub fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

/// # Errors
/// Never fails on platforms without an executable bit.
#[cfg(not(unix))]
pub fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Run the installer with inherited stdio from its own directory, with
/// `guard_env=1` in its environment.
///
/// When `shell` resolves on `PATH` the script is passed to it; otherwise the
/// script is executed directly.
///
/// # Errors
/// Returns an error when the process cannot be started or exits unsuccessfully.
pub async fn run_installer(
    installer: &Path,
    shell: Option<&str>,
    guard_env: &str,
) -> Result<(), InstallerError> {
    let interpreter = shell.and_then(|shell| match which::which(shell) {
        Ok(path) => Some(path),
        Err(error) => {
            warn!("Installer shell {shell} not found ({error}); running script directly");
            None
        }
    });

    let mut cmd = match &interpreter {
        Some(program) => {
            let mut cmd = Command::new(program);
            cmd.arg(installer);
            cmd
        }
        None => Command::new(installer),
    };
    if let Some(dir) = installer.parent() {
        cmd.current_dir(dir);
    }
    cmd.env(guard_env, "1")
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let program = interpreter
        .as_deref()
        .unwrap_or(installer)
        .display()
        .to_string();
    info!("Running installer {} via {program}", installer.display());

    let status = cmd
        .status()
        .await
        .map_err(|source| InstallerError::Spawn { program, source })?;

    if status.success() {
        debug!("Installer finished successfully");
        Ok(())
    } else {
        Err(status
            .code()
            .map_or(InstallerError::Signaled, |code| InstallerError::Exit { code }))
    }
}

/// Run a configured `[program, args...]` command with `guard_env=1`.
///
/// # Errors
/// Returns an error when the command is empty, cannot be started, or exits
/// unsuccessfully.
pub async fn run_uninstall_command(argv: &[String], guard_env: &str) -> Result<(), InstallerError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(InstallerError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    debug!("Running uninstall command {program} {args:?}");
    let status = Command::new(program)
        .args(args)
        .env(guard_env, "1")
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|source| InstallerError::Spawn {
            program: program.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(status
            .code()
            .map_or(InstallerError::Signaled, |code| InstallerError::Exit { code }))
    }
}

/// Command restarting `program` outside the update guard.
#[must_use]
pub fn relaunch_command(program: &Path, guard_env: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.env_remove(guard_env);
    cmd
}

/// Program to relaunch after an update: the installed launcher when present,
/// otherwise the running executable.
///
/// On Linux a replaced executable reports a path ending in ` (deleted)`,
/// which is stripped.
#[must_use]
pub fn relaunch_program(launcher: &Path) -> Option<PathBuf> {
    if launcher.is_file() {
        return Some(launcher.to_path_buf());
    }

    let exe = std::env::current_exe().ok()?;
    let path_str = exe.to_string_lossy();
    if let Some(fixed) = path_str.strip_suffix(" (deleted)") {
        info!("Adjusted exe path from deleted inode: {fixed}");
        return Some(PathBuf::from(fixed));
    }
    Some(exe)
}

#[cfg(test)]
mod tests {
    use super::{
        InstallerError, locate_installer, relaunch_command, relaunch_program, run_uninstall_command,
    };

    #[test]
    fn locate_installer_prefers_shallowest_match() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path();
        std::fs::create_dir_all(root.join("Solar-Neo-main/vendor/tool"))
            .expect("tree should be created");
        std::fs::write(root.join("Solar-Neo-main/vendor/tool/install.sh"), "")
            .expect("nested installer should be written");
        std::fs::write(root.join("Solar-Neo-main/install.sh"), "")
            .expect("top installer should be written");

        let found = locate_installer(root, "install.sh").expect("installer should be found");

        assert_eq!(found, root.join("Solar-Neo-main/install.sh"));
    }

    #[test]
    fn locate_installer_ignores_directories_with_the_name() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::create_dir_all(temp.path().join("install.sh")).expect("dir should be created");

        assert!(locate_installer(temp.path(), "install.sh").is_none());
    }

    #[test]
    fn relaunch_command_drops_guard_variable() {
        let cmd = relaunch_command(std::path::Path::new("/usr/bin/solar"), "SOLAR_UPDATING");

        let removed = cmd
            .get_envs()
            .any(|(key, value)| key == "SOLAR_UPDATING" && value.is_none());
        assert!(removed);
        assert_eq!(cmd.get_program(), "/usr/bin/solar");
    }

    #[test]
    fn relaunch_program_prefers_installed_launcher() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let launcher = temp.path().join("solar");
        std::fs::write(&launcher, "#!/bin/sh\n").expect("launcher should be written");

        assert_eq!(relaunch_program(&launcher), Some(launcher));
        assert!(relaunch_program(&temp.path().join("missing")).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_installer_reports_exit_code_and_sets_guard() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let script = temp.path().join("install.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n[ \"$SOLAR_UPDATING\" = 1 ] || exit 9\npwd > cwd.txt\nexit 3\n",
        )
        .expect("script should be written");
        super::mark_executable(&script).expect("script should be executable");

        let result = super::run_installer(&script, Some("sh"), "SOLAR_UPDATING").await;

        assert!(matches!(result, Err(InstallerError::Exit { code: 3 })));
        let cwd = std::fs::read_to_string(temp.path().join("cwd.txt"))
            .expect("installer should run in its own directory");
        assert_eq!(
            std::fs::canonicalize(cwd.trim()).expect("cwd should resolve"),
            std::fs::canonicalize(temp.path()).expect("temp should resolve")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_installer_executes_script_directly_without_shell() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let script = temp.path().join("install.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").expect("script should be written");
        super::mark_executable(&script).expect("script should be executable");

        super::run_installer(&script, Some("definitely-not-a-shell-xyz"), "SOLAR_UPDATING")
            .await
            .expect("script should run directly");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn uninstall_command_failures_are_reported() {
        let ok = run_uninstall_command(&["true".to_string()], "SOLAR_UPDATING").await;
        let failed = run_uninstall_command(
            &["sh".to_string(), "-c".to_string(), "exit 4".to_string()],
            "SOLAR_UPDATING",
        )
        .await;
        let empty = run_uninstall_command(&[], "SOLAR_UPDATING").await;

        assert!(ok.is_ok());
        assert!(matches!(failed, Err(InstallerError::Exit { code: 4 })));
        assert!(matches!(empty, Err(InstallerError::Spawn { .. })));
    }
}
