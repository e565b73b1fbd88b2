//! Session error types

use shellproc_process::ProcessError;
use thiserror::Error;

use crate::terminal::TerminalId;

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// The owning terminal was unregistered while the session still needed it
    #[error("Unable to dereference terminal {0}")]
    TerminalUnavailable(TerminalId),

    /// `run` was called on a session that already ran a command
    #[error("Session has already run a command")]
    AlreadyStarted,

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings were loaded but are unusable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Settings could not be written
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
