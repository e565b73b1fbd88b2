//! # shellproc-session
//!
//! **Purpose**: Observable, abortable shell command sessions
//!
//! A [`ShellSession`] runs one command through the platform shell, collects
//! its merged output, pushes complete lines to subscribers at a throttled
//! rate, and tears the whole process tree down on [`ShellSession::abort`].
//!
//! ## Features
//!
//! - **Streaming Output**: throttled line notifications plus a pull-style
//!   cursor ([`ShellSession::get_unretrieved_output`])
//! - **Lifecycle Events**: `ShellExecutionComplete`, `Completed` and `Continue`
//!   over a broadcast bus
//! - **Hot State**: an idle timer that stays hot longer for compile output
//! - **Termination Cascade**: snapshot, then kill the command and every
//!   descendant, with a bounded wait for the shell
//! - **Settings**: defaults, TOML file and `SHELLPROC_*` environment layers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shellproc_session::{BasicTerminal, SessionSettings, ShellSession, TerminalRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TerminalRegistry::new();
//! let terminal = registry.register(BasicTerminal::new(None));
//! let session = ShellSession::new(terminal, SessionSettings::default());
//!
//! let mut lines = session.subscribe_lines();
//! tokio::spawn(async move {
//!     while let Ok(text) = lines.recv().await {
//!         print!("{text}");
//!     }
//! });
//!
//! session.run("cargo test").await?;
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod error;
pub mod events;
pub mod hot;
pub mod output;
pub mod session;
pub mod settings;
pub mod terminal;

pub use abort::TerminationCascade;
pub use error::{Result, SessionError};
pub use events::{EventBus, LineBus, SessionEvent, ShellExecutionDetails};
pub use hot::{is_compiling, HotTimer, HOT_TIMEOUT_COMPILING, HOT_TIMEOUT_NORMAL};
pub use output::OutputBuffer;
pub use session::{ResolutionState, SessionCollaborators, ShellSession};
pub use settings::{to_toml, SessionSettings, SettingsLoader, ShellOverride};
pub use terminal::{ActiveStream, BasicTerminal, Terminal, TerminalId, TerminalRef, TerminalRegistry};
