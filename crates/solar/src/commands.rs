use std::path::PathBuf;

use log::{info, warn};
use solar_core::{
    BackupStore, InstallLayout, RunContext, UpdateOrchestrator, UpdateOutcome, installer,
    remove_targets,
};
use solar_platform::AppPaths;

use crate::error::CliError;
use crate::settings::AppSettings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn banner(paths: &AppPaths) {
    let layout = InstallLayout::from_paths(paths);
    println!("Solar Neo {}", layout.installed_version(VERSION));
    println!("Run `solar --help` for available commands.");
}

pub async fn self_update(
    paths: &AppPaths,
    settings: &AppSettings,
    force: bool,
) -> Result<i32, CliError> {
    paths
        .ensure_dirs()
        .map_err(|error| CliError::io("failed to create app directories", error))?;

    let config = settings.update.clone();
    let context = RunContext::from_env(&config.guard_env, force);
    let orchestrator =
        UpdateOrchestrator::new(config, InstallLayout::from_paths(paths), VERSION)?;

    let report = orchestrator.run(&context).await;

    match &report.outcome {
        UpdateOutcome::UpToDate { installed, latest } => {
            println!("Solar Neo {installed} is up to date (latest release: {latest}).");
        }
        UpdateOutcome::Updated {
            from,
            to,
            backup,
            source_fallback,
        } => {
            let source = if *source_fallback {
                " from the source snapshot"
            } else {
                ""
            };
            println!("Updated Solar Neo {from} -> {to}{source}.");
            if let Some(backup) = backup {
                println!("Previous installation saved in {}", backup.display());
            }
            if settings.relaunch_after_update {
                relaunch(paths, &settings.update.guard_env);
            }
        }
        UpdateOutcome::Failed(error) => {
            eprintln!("Update failed: {error}");
            if let Some(slot) = error.backup().and_then(|path| path.file_name()) {
                eprintln!(
                    "Restore the previous installation with: solar restore {}",
                    slot.to_string_lossy()
                );
            }
            eprintln!(
                "See {} for details.",
                orchestrator.audit_log().active_path().display()
            );
        }
        UpdateOutcome::Aborted(_) => {
            println!("An update is already running; nothing to do.");
        }
    }

    Ok(report.outcome.exit_code())
}

fn relaunch(paths: &AppPaths, guard_env: &str) {
    let Some(program) = installer::relaunch_program(&paths.launcher()) else {
        warn!("Could not determine which program to relaunch");
        return;
    };

    info!("Restarting {}", program.display());
    match installer::relaunch_command(&program, guard_env).status() {
        Ok(status) if !status.success() => warn!("Relaunched solar exited with {status}"),
        Ok(_) => {}
        Err(error) => warn!("Failed to relaunch {}: {error}", program.display()),
    }
}

pub fn uninstall_self(targets: &[PathBuf]) -> Result<i32, CliError> {
    let report = remove_targets(targets);

    for path in &report.removed {
        println!("Removed {}", path.display());
    }
    for (path, error) in &report.failed {
        eprintln!("Could not remove {}: {error}", path.display());
    }

    if report.is_clean() {
        println!("Solar Neo removed from your user environment.");
        println!("Run `hash -r` or open a new shell to refresh PATH.");
        Ok(0)
    } else {
        Err(CliError::Uninstall {
            failed: report.failed.len(),
        })
    }
}

pub fn list_backups(paths: &AppPaths) -> Result<i32, CliError> {
    let slots = BackupStore::new(paths.backup_dir()).list()?;

    if slots.is_empty() {
        println!("No backups in {}", paths.backup_dir().display());
        return Ok(0);
    }

    for slot in slots {
        println!(
            "{}  {}  {}",
            slot.name,
            slot.manifest.version,
            slot.manifest
                .created_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(0)
}

pub fn restore(paths: &AppPaths, slot: &str) -> Result<i32, CliError> {
    let store = BackupStore::new(paths.backup_dir());
    let restored = store.restore(slot, &paths.package_dir())?;

    println!(
        "Restored Solar Neo {} from backup {}",
        restored.manifest.version, restored.name
    );
    Ok(0)
}
