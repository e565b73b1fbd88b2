//! Handle to a launched shell process
//!
//! The tokio [`Child`] is owned by a background reaper task so that the
//! process can be killed from any task while another one waits for it.

use std::process::ExitStatus;

use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// How a process ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal number (Unix only)
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Outcome for a normal exit with the given code
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Outcome for a process terminated by a signal
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Build from an OS exit status
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Exit code reported to callers; 0 when only a signal is known
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(0)
    }

    /// Signal name such as `SIGKILL`
    pub fn signal_name(&self) -> Option<String> {
        let signal = self.signal?;

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            return Some(
                Signal::try_from(signal)
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|_| format!("SIG{signal}")),
            );
        }

        #[cfg(not(unix))]
        {
            Some(format!("SIG{signal}"))
        }
    }
}

/// Cloneable handle to a running (or finished) shell process
#[derive(Debug, Clone)]
pub struct ChildController {
    pid: u32,
    kill_tx: mpsc::UnboundedSender<()>,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ChildController {
    /// Take ownership of a spawned child and start reaping it
    pub(crate) fn spawn_reaper(child: Child, pid: u32) -> Self {
        let (controller, simulated) = Self::simulated(pid);
        let SimulatedChild { kill_rx, exit_tx } = simulated;
        tokio::spawn(reap(child, pid, kill_rx, exit_tx));
        controller
    }

    /// Controller driven by a [`SimulatedChild`] instead of an OS process.
    ///
    /// Used to run sessions against scripted processes.
    pub fn simulated(pid: u32) -> (Self, SimulatedChild) {
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        (
            Self {
                pid,
                kill_tx,
                exit_rx,
            },
            SimulatedChild { kill_rx, exit_tx },
        )
    }

    /// Process ID of the shell
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Request a forceful kill. Returns `false` when the process is already
    /// reaped and the request went nowhere.
    pub fn kill(&self) -> bool {
        self.kill_tx.send(()).is_ok()
    }

    /// Exit outcome if the process has already ended
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit_rx.borrow().clone()
    }

    /// Check if process is still running
    pub fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Wait for the process to exit
    pub async fn wait(&self) -> ExitOutcome {
        let mut rx = self.exit_rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        // reaper gone without reporting: treat as an unknown exit
        outcome.unwrap_or_default()
    }
}

/// The other end of a simulated [`ChildController`]
#[derive(Debug)]
pub struct SimulatedChild {
    kill_rx: mpsc::UnboundedReceiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
}

impl SimulatedChild {
    /// Wait for the next kill request; `None` once every controller is gone
    pub async fn kill_requested(&mut self) -> Option<()> {
        self.kill_rx.recv().await
    }

    /// Number of kill requests received so far, without waiting
    pub fn drain_kill_requests(&mut self) -> usize {
        let mut count = 0;
        while self.kill_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Report that the process ended
    pub fn exit(&self, outcome: ExitOutcome) {
        let _ = self.exit_tx.send(Some(outcome));
    }
}

async fn reap(
    mut child: Child,
    pid: u32,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = kill_rx.recv() => match request {
                Some(()) => {
                    if let Err(e) = child.start_kill() {
                        debug!(pid = %pid, error = %e, "Kill request ignored, process already gone");
                    } else {
                        debug!(pid = %pid, "Sent kill to shell process");
                    }
                }
                None => break child.wait().await,
            },
        }
    };

    let outcome = match status {
        Ok(status) => ExitOutcome::from_status(status),
        Err(e) => {
            warn!(pid = %pid, error = %e, "Error waiting for process");
            ExitOutcome::default()
        }
    };

    debug!(pid = %pid, code = ?outcome.code, signal = ?outcome.signal, "Process exited");
    let _ = exit_tx.send(Some(outcome));
}
