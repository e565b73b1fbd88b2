//! Error types for process management

use std::io;
use thiserror::Error;

/// Process management errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to spawn the shell
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// Operation timed out
    #[error("Process operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Failed to kill process
    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    /// Sampling the OS process table failed
    #[error("Failed to sample process tree for PID {pid}: {reason}")]
    ProcessTree { pid: u32, reason: String },

    /// Invalid configuration
    #[error("Invalid process configuration: {0}")]
    InvalidConfig(String),

    /// Process not found
    #[error("Process not found (PID: {pid})")]
    NotFound { pid: u32 },
}

impl ProcessError {
    /// Build a [`ProcessError::KillFailed`] from anything displayable
    pub fn kill_failed(pid: u32, reason: impl ToString) -> Self {
        ProcessError::KillFailed {
            pid,
            reason: reason.to_string(),
        }
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
