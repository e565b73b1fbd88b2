//! Forceful process termination.
//!
//! Two strategies behind [`KillStrategy`], picked once per platform:
//! - [`PosixKill`]: deliver `SIGKILL` straight to the PID
//! - [`TreeKill`]: `taskkill /pid <pid> /T /F`, falling back to a direct kill
//!   of that single PID when the utility fails for any reason other than the
//!   process already being gone

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{ProcessError, Result};

/// Timeout for the external tree-kill utility (matches the 5s kill window)
pub const DEFAULT_TREE_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers a forceful kill to a single PID
pub trait SignalSender: Send + Sync {
    /// Kill `pid`. [`ProcessError::NotFound`] when it no longer exists.
    fn kill(&self, pid: u32) -> Result<()>;
}

/// Reject PIDs that would address a process group or every process
fn checked_pid(pid: u32) -> Result<i32> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(ProcessError::InvalidConfig(format!(
            "refusing to signal pid {pid}"
        ))),
    }
}

/// `SIGKILL` via `kill(2)`
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignalSender;

#[cfg(unix)]
impl SignalSender for NixSignalSender {
    fn kill(&self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = checked_pid(pid)?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProcessError::NotFound { pid }),
            Err(e) => Err(ProcessError::kill_failed(pid, e)),
        }
    }
}

/// Kill through `sysinfo`; works where there is no `kill(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSignalSender;

impl SignalSender for SysinfoSignalSender {
    fn kill(&self, pid: u32) -> Result<()> {
        use sysinfo::{Pid, System};

        checked_pid(pid)?;
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_process(target);

        let process = system.process(target).ok_or(ProcessError::NotFound { pid })?;
        if process.kill() {
            Ok(())
        } else {
            Err(ProcessError::kill_failed(pid, "kill request was rejected"))
        }
    }
}

/// Platform signal sender
pub fn platform_signal_sender() -> Arc<dyn SignalSender> {
    #[cfg(unix)]
    {
        return Arc::new(NixSignalSender);
    }

    #[cfg(not(unix))]
    {
        Arc::new(SysinfoSignalSender)
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Whether the command exited with status 0
    pub success: bool,
    /// Exit code, if any
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutcome {
    /// Stdout and stderr joined, for error classification
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs an external utility to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args…`, killing it when `timeout` elapses
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutcome>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutcome> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, output)
            .await
            .map_err(|_| ProcessError::Timeout {
                millis: timeout.as_millis() as u64,
            })??;

        Ok(CommandOutcome {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Platform-specific forceful termination of one PID
#[async_trait]
pub trait KillStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Forcefully terminate `pid`. An already-exited process may be reported
    /// as [`ProcessError::NotFound`] or as success, depending on the strategy.
    async fn kill(&self, pid: u32) -> Result<()>;
}

/// Direct signal delivery, for platforms with native signals
pub struct PosixKill {
    signals: Arc<dyn SignalSender>,
}

impl PosixKill {
    /// Create with the given signal sender
    pub fn new(signals: Arc<dyn SignalSender>) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl KillStrategy for PosixKill {
    fn name(&self) -> &'static str {
        "posix-signal"
    }

    async fn kill(&self, pid: u32) -> Result<()> {
        debug!(pid = %pid, "SIGKILL");
        self.signals.kill(pid)
    }
}

/// `taskkill /T /F` with a direct-kill fallback
pub struct TreeKill {
    program: String,
    runner: Arc<dyn CommandRunner>,
    fallback: Arc<dyn SignalSender>,
    timeout: Duration,
}

impl TreeKill {
    /// Create with an explicit runner and fallback
    pub fn new(runner: Arc<dyn CommandRunner>, fallback: Arc<dyn SignalSender>) -> Self {
        Self {
            program: Self::locate_taskkill(),
            runner,
            fallback,
            timeout: DEFAULT_TREE_KILL_TIMEOUT,
        }
    }

    /// Override the utility timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the utility program
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[cfg(windows)]
    fn locate_taskkill() -> String {
        which::which("taskkill")
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "taskkill".to_string())
    }

    #[cfg(not(windows))]
    fn locate_taskkill() -> String {
        "taskkill".to_string()
    }

    fn already_gone(message: &str) -> bool {
        message.contains("The process") && message.contains("not found")
    }

    fn access_denied(message: &str) -> bool {
        message.contains("Access is denied") || message.contains("Access denied")
    }
}

#[async_trait]
impl KillStrategy for TreeKill {
    fn name(&self) -> &'static str {
        "tree-kill"
    }

    async fn kill(&self, pid: u32) -> Result<()> {
        info!(pid = %pid, "Attempting to terminate process tree");

        let args: Vec<String> = vec![
            "/pid".to_string(),
            pid.to_string(),
            "/T".to_string(),
            "/F".to_string(),
        ];

        let failure = match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(outcome) if outcome.success => {
                info!(pid = %pid, output = %outcome.stdout.trim(), "Terminated process and its tree");
                return Ok(());
            }
            Ok(outcome) => outcome.combined(),
            Err(e) => e.to_string(),
        };

        warn!(pid = %pid, error = %failure.trim(), "taskkill failed");

        if Self::access_denied(&failure) {
            error!(
                pid = %pid,
                "Permission denied terminating process; administrator privileges may be required"
            );
        } else if Self::already_gone(&failure) {
            info!(pid = %pid, "Process was already terminated or not found");
            return Ok(());
        }

        debug!(pid = %pid, "Trying direct kill fallback");
        match self.fallback.kill(pid) {
            Ok(()) => {
                info!(pid = %pid, "Fallback kill succeeded");
                Ok(())
            }
            Err(e) => {
                error!(
                    pid = %pid,
                    error = %e,
                    "All termination methods failed; the process may need to be terminated manually"
                );
                Err(e)
            }
        }
    }
}

/// Kill strategy for the platform this binary was built for
pub fn platform_kill_strategy(tree_kill_timeout: Duration) -> Arc<dyn KillStrategy> {
    if cfg!(windows) {
        Arc::new(
            TreeKill::new(Arc::new(TokioCommandRunner), platform_signal_sender())
                .with_timeout(tree_kill_timeout),
        )
    } else {
        Arc::new(PosixKill::new(platform_signal_sender()))
    }
}
