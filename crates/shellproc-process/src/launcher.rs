//! Shell launcher - spawns a command under the platform shell

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    child::ChildController,
    config::LaunchConfig,
    error::{ProcessError, Result},
    output::{BoxedReader, OutputStream},
};

/// A freshly spawned shell and its merged output
pub struct LaunchedShell {
    /// PID of the shell process (not necessarily the command)
    pub pid: u32,
    /// Handle used to kill and await the shell
    pub controller: ChildController,
    /// Merged, decoded stdout/stderr
    pub output: OutputStream,
}

impl std::fmt::Debug for LaunchedShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedShell")
            .field("pid", &self.pid)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

/// Starts shell commands
pub trait Launcher: Send + Sync {
    /// Spawn `command` under the configured shell.
    ///
    /// Must be called from within a tokio runtime.
    fn launch(&self, config: &LaunchConfig, command: &str) -> Result<LaunchedShell>;
}

/// [`Launcher`] that spawns real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLauncher;

impl ShellLauncher {
    /// Create new launcher
    pub fn new() -> Self {
        Self
    }

    /// Build the `tokio` command for a launch
    fn build_command(config: &LaunchConfig, command: &str) -> Command {
        let mut cmd = Command::new(&config.shell.program);
        cmd.args(&config.shell.args);
        cmd.arg(command);

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.envs(config.effective_env());

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, config: &LaunchConfig, command: &str) -> Result<LaunchedShell> {
        config.validate()?;

        debug!(
            shell = %config.shell.program,
            command = %command,
            cwd = ?config.working_dir,
            "Spawning shell"
        );

        let mut child = Self::build_command(config, command).spawn()?;
        let pid = child.id().ok_or_else(|| {
            ProcessError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Failed to get process ID",
            ))
        })?;

        let mut readers: Vec<(&'static str, BoxedReader)> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(("stdout", Box::new(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(("stderr", Box::new(stderr)));
        }
        let output = OutputStream::merge(readers);
        let controller = ChildController::spawn_reaper(child, pid);

        info!(pid = %pid, command = %command, "Shell spawned");

        Ok(LaunchedShell {
            pid,
            controller,
            output,
        })
    }
}
