//! # shellproc-process
//!
//! **Purpose**: Process plumbing for shell sessions
//!
//! Spawns shell commands, merges their output into one decoded stream, finds
//! the real command PID beneath the shell, and forcefully terminates process
//! trees across platforms.
//!
//! ## Features
//!
//! - **Shell Launching**: `sh -c` / `cmd /d /s /c` with stdin closed and a
//!   forced UTF-8 locale
//! - **Merged Output**: stdout and stderr as one stream of UTF-8 text chunks
//! - **PID Resolution**: bounded, backed-off process-tree sampling
//! - **Kill Strategies**: `SIGKILL` on Unix, `taskkill /T /F` with fallback on
//!   Windows
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use shellproc_process::{LaunchConfig, Launcher, PidResolver, ShellLauncher, SysinfoProcessTree};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let launched = ShellLauncher::new().launch(&LaunchConfig::new(), "cargo build")?;
//!
//! let resolver = PidResolver::new(Arc::new(SysinfoProcessTree::new()));
//! let real_pid = resolver.resolve(launched.pid).await.unwrap_or(launched.pid);
//! println!("command pid: {real_pid}");
//!
//! let mut output = launched.output;
//! while let Some(chunk) = output.next().await {
//!     print!("{chunk}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod config;
pub mod error;
pub mod kill;
pub mod launcher;
pub mod output;
pub mod process_tree;
pub mod resolver;

pub use child::{ChildController, ExitOutcome, SimulatedChild};
pub use config::{LaunchConfig, ShellSpec, DEFAULT_UTF8_LOCALE};
pub use error::{ProcessError, Result};
pub use kill::{
    platform_kill_strategy, platform_signal_sender, CommandOutcome, CommandRunner, KillStrategy,
    PosixKill, SignalSender, SysinfoSignalSender, TokioCommandRunner, TreeKill,
};
#[cfg(unix)]
pub use kill::NixSignalSender;
pub use launcher::{LaunchedShell, Launcher, ShellLauncher};
pub use output::{OutputStream, Utf8ChunkDecoder};
pub use process_tree::{collect_descendants, sample_descendants, ProcessInfo, ProcessTree, SysinfoProcessTree};
pub use resolver::{PidResolver, SelectionRule, WINDOWS_SHELL_HOSTS};
