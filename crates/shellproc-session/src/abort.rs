//! Termination cascade run when a session is aborted

use std::sync::Arc;

use shellproc_process::{sample_descendants, ChildController, KillStrategy, ProcessError, ProcessTree};
use tracing::{debug, error, info, warn};

/// Kills a command, its shell and everything beneath it
#[derive(Clone)]
pub struct TerminationCascade {
    tree: Arc<dyn ProcessTree>,
    strategy: Arc<dyn KillStrategy>,
}

impl TerminationCascade {
    pub fn new(tree: Arc<dyn ProcessTree>, strategy: Arc<dyn KillStrategy>) -> Self {
        Self { tree, strategy }
    }

    /// Terminate `target` and its descendants.
    ///
    /// The descendant list is captured before anything is killed, since
    /// orphaned children get re-parented and drop out of the tree. The
    /// direct kill and the descendant sweep then run concurrently. Failures
    /// are logged, never returned.
    ///
    /// Only `target`'s own subtree is swept. Other children of the shell
    /// beside a resolved `target` are left running.
    pub async fn execute(&self, controller: Option<&ChildController>, target: u32) {
        info!(pid = %target, strategy = self.strategy.name(), "Aborting command");

        let descendants = match sample_descendants(Arc::clone(&self.tree), target).await {
            Ok(list) => list,
            Err(e) => {
                error!(pid = %target, error = %e, "Failed to snapshot process tree before kill");
                Vec::new()
            }
        };
        debug!(pid = %target, descendants = descendants.len(), "Captured process tree");

        let direct = async {
            if let Some(controller) = controller {
                if !controller.kill() {
                    debug!(pid = %controller.pid(), "Shell already reaped");
                }
            }
            log_kill_result(target, self.strategy.kill(target).await);
        };

        let sweep = futures::future::join_all(descendants.iter().map(|child| async move {
            log_kill_result(child.pid, self.strategy.kill(child.pid).await);
        }));

        tokio::join!(direct, sweep);
    }
}

fn log_kill_result(pid: u32, result: Result<(), ProcessError>) {
    match result {
        Ok(()) => debug!(pid = %pid, "Kill delivered"),
        Err(ProcessError::NotFound { .. }) => debug!(pid = %pid, "Process already gone"),
        Err(e) => warn!(pid = %pid, error = %e, "Failed to kill process"),
    }
}

impl std::fmt::Debug for TerminationCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationCascade")
            .field("strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}
