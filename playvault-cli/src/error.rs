use playvault_core::Platform;
use thiserror::Error;

/// Errors that end a `playvault` command with exit code 1.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Opening or reading the library database failed
    #[error("Database error: {0}")]
    Database(String),

    /// Settings file, aliases, or a missing required option
    #[error("Config error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A sync cycle did not commit
    #[error("Sync failed: {0}")]
    Sync(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("No game with id '{0}' (see 'playvault list')")]
    UnknownGame(String),

    #[error("'{id}' is not owned on {platform}")]
    NotOwned { id: String, platform: Platform },
}

impl CliError {
    pub(crate) fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub(crate) fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    pub(crate) fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    pub(crate) fn unknown_game(id: impl Into<String>) -> Self {
        Self::UnknownGame(id.into())
    }
}
