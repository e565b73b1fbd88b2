//! Resolve the real command PID beneath a shell wrapper.
//!
//! A `sh -c` / `cmd /c` launch makes the shell the direct child, so the PID we
//! get back from spawn is not the process doing the work. The resolver samples
//! the process tree a bounded number of times and picks the first plausible
//! descendant.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process_tree::{sample_descendants, ProcessInfo, ProcessTree};

/// Default number of sampling attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay; attempt `n` waits `n × base`
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Console/shell host processes a Windows `cmd` launch spawns next to the
/// real command
pub const WINDOWS_SHELL_HOSTS: &[&str] = &["conhost.exe", "cmd.exe", "powershell.exe", "pwsh.exe"];

/// How to choose the command process among a shell's descendants.
///
/// Only one descendant is picked. When a shell backgrounds several jobs
/// (`a & b & wait`), the abort sweep is rooted at the chosen PID, so its
/// siblings are not reached and outlive the abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRule {
    /// Take the first descendant
    FirstChild,
    /// Skip names containing any of these (case-insensitive), then take the
    /// first remaining descendant.
    ///
    /// Heuristic: with several children this can pick a sibling rather than
    /// the command itself.
    SkipShellHosts(Vec<String>),
}

impl SelectionRule {
    /// Rule for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::FirstChild
        }
    }

    /// The Windows shell-host denylist rule
    pub fn windows() -> Self {
        Self::SkipShellHosts(WINDOWS_SHELL_HOSTS.iter().map(|s| s.to_string()).collect())
    }

    /// Pick a candidate from a snapshot
    pub fn select<'a>(&self, candidates: &'a [ProcessInfo]) -> Option<&'a ProcessInfo> {
        match self {
            Self::FirstChild => candidates.first(),
            Self::SkipShellHosts(denylist) => candidates.iter().find(|candidate| {
                let name = candidate.name.to_lowercase();
                !denylist.iter().any(|host| name.contains(&host.to_lowercase()))
            }),
        }
    }
}

/// Bounded retry loop that looks for the command PID beneath a shell
#[derive(Clone)]
pub struct PidResolver {
    tree: Arc<dyn ProcessTree>,
    rule: SelectionRule,
    max_attempts: u32,
    base_delay: Duration,
}

impl PidResolver {
    /// Create a resolver with the platform rule and default timing
    pub fn new(tree: Arc<dyn ProcessTree>) -> Self {
        Self {
            tree,
            rule: SelectionRule::for_current_platform(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Override the selection rule
    pub fn with_rule(mut self, rule: SelectionRule) -> Self {
        self.rule = rule;
        self
    }

    /// Override attempt count and base delay
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.base_delay = base_delay;
        self
    }

    /// Maximum number of samples taken
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Resolve the command PID beneath `shell_pid`.
    ///
    /// Returns `None` when no suitable descendant shows up within the attempt
    /// budget; the caller keeps using the shell PID.
    pub async fn resolve(&self, shell_pid: u32) -> Option<u32> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.base_delay * attempt).await;

            let candidates = match sample_descendants(Arc::clone(&self.tree), shell_pid).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    debug!(pid = %shell_pid, attempt, error = %e, "Process tree sample failed");
                    continue;
                }
            };

            if let Some(found) = self.rule.select(&candidates) {
                info!(
                    shell_pid = %shell_pid,
                    pid = %found.pid,
                    command = %found.name,
                    attempt,
                    "Resolved command PID"
                );
                return Some(found.pid);
            }

            debug!(pid = %shell_pid, attempt, candidates = candidates.len(), "No command process yet");
        }

        warn!(
            pid = %shell_pid,
            attempts = self.max_attempts,
            "Could not find actual command PID, keeping shell PID"
        );
        None
    }
}

impl std::fmt::Debug for PidResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidResolver")
            .field("rule", &self.rule)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}
