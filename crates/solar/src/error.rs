use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] solar_platform::AppPathsError),
    #[error(transparent)]
    Update(#[from] solar_core::UpdateError),
    #[error(transparent)]
    Backup(#[from] solar_core::BackupError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{failed} path(s) could not be removed")]
    Uninstall { failed: usize },
}

impl CliError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
