mod commands;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use solar_platform::AppPaths;

use crate::error::CliError;
use crate::settings::AppSettings;

#[derive(Parser, Debug)]
#[command(name = "solar", version)]
#[command(about = "Solar Neo package helper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and install the latest Solar Neo release
    SelfUpdate {
        /// Reinstall even when the installed version is current
        #[arg(long)]
        force: bool,
    },
    /// Remove Solar Neo from this user environment
    UninstallSelf,
    /// List backups of previous installations
    Backups,
    /// Put a backup back in place of the installed package
    Restore { slot: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("{}", CliError::from(error));
            return ExitCode::FAILURE;
        }
    };
    let settings = AppSettings::load(&paths);
    logging::init_logging(&paths, settings.debug_enabled(), settings.max_log_size_bytes);

    match run(cli.command, &paths, &settings).await {
        Ok(code) => exit_code(code),
        Err(error) => {
            log::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Option<Commands>,
    paths: &AppPaths,
    settings: &AppSettings,
) -> Result<i32, CliError> {
    match command {
        None => {
            commands::banner(paths);
            Ok(0)
        }
        Some(Commands::SelfUpdate { force }) => commands::self_update(paths, settings, force).await,
        Some(Commands::UninstallSelf) => {
            commands::uninstall_self(&solar_core::uninstall_targets(paths))
        }
        Some(Commands::Backups) => commands::list_backups(paths),
        Some(Commands::Restore { slot }) => commands::restore(paths, &slot),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_status(code))
}

/// Codes outside `0..=255` collapse to 1.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, exit_status};

    #[test]
    fn parses_self_update_with_force() {
        let cli = Cli::try_parse_from(["solar", "self-update", "--force"])
            .expect("self-update should parse");

        assert!(matches!(
            cli.command,
            Some(Commands::SelfUpdate { force: true })
        ));
    }

    #[test]
    fn parses_kebab_case_subcommands() {
        let uninstall =
            Cli::try_parse_from(["solar", "uninstall-self"]).expect("uninstall-self should parse");
        let restore = Cli::try_parse_from(["solar", "restore", "20260101-120000"])
            .expect("restore should parse");
        let bare = Cli::try_parse_from(["solar"]).expect("bare invocation should parse");

        assert!(matches!(uninstall.command, Some(Commands::UninstallSelf)));
        assert!(matches!(
            restore.command,
            Some(Commands::Restore { ref slot }) if slot == "20260101-120000"
        ));
        assert!(bare.command.is_none());
    }

    #[test]
    fn restore_requires_a_slot() {
        assert!(Cli::try_parse_from(["solar", "restore"]).is_err());
    }

    #[test]
    fn exit_code_passes_installer_codes_through() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(7), 7);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }
}
