// Subcommand implementations

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use shellproc_session::{
    to_toml, BasicTerminal, SessionEvent, SessionSettings, SettingsLoader, ShellExecutionDetails,
    ShellSession, TerminalRegistry,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::logging::init_logging;
use crate::router::ConfigAction;

/// Exit code reported when the user interrupted the command
pub const EXIT_INTERRUPTED: i32 = 130;

fn loader(config: Option<&Path>) -> SettingsLoader {
    match config {
        Some(path) => SettingsLoader::with_path(path),
        None => SettingsLoader::new(),
    }
}

/// Exit code for the process, from the shell's completion details
pub fn exit_code_for(details: Option<&ShellExecutionDetails>, aborted: bool) -> i32 {
    match details {
        Some(details) if details.exit_code != 0 => details.exit_code,
        _ if aborted => EXIT_INTERRUPTED,
        Some(details) if details.signal_name.is_some() => 1,
        Some(_) => 0,
        None => 1,
    }
}

/// Run one command as a session, streaming its lines to stdout
pub async fn run(
    config: Option<&Path>,
    verbose: bool,
    cwd: Option<PathBuf>,
    command: &str,
) -> anyhow::Result<i32> {
    let settings = loader(config).load().context("failed to load settings")?;
    init_logging(&settings.log_level, verbose);

    let cwd = match cwd {
        Some(dir) => Some(dir),
        None => std::env::current_dir().ok(),
    };
    let registry = TerminalRegistry::new();
    let terminal = registry.register(BasicTerminal::new(cwd));
    let session = ShellSession::new(terminal, settings);

    let mut lines = session.subscribe_lines();
    let mut events = session.subscribe();

    let interrupt = session.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping command...".yellow());
            interrupt.abort();
        }
    });

    let mut stdout = std::io::stdout();
    let mut printed = 0usize;
    let mut lines_open = true;

    let run = session.run(command);
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            line = lines.recv(), if lines_open => match line {
                Ok(text) => {
                    printed += text.len();
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output printer fell behind"),
                Err(RecvError::Closed) => lines_open = false,
            },
        }
    };
    ctrl_c.abort();

    loop {
        match lines.try_recv() {
            Ok(text) => {
                printed += text.len();
                stdout.write_all(text.as_bytes())?;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    // the last line without a newline is never pushed
    let full = session.full_output();
    if let Some(tail) = full.get(printed..) {
        stdout.write_all(tail.as_bytes())?;
    }
    stdout.flush()?;

    result.context("session failed")?;

    let mut details = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ShellExecutionComplete(d) = event {
            details = Some(d);
        }
    }
    debug!(details = ?details, aborted = session.is_aborted(), "Command finished");

    Ok(exit_code_for(details.as_ref(), session.is_aborted()))
}

/// `config` subcommand
pub fn config(config: Option<&Path>, action: ConfigAction) -> anyhow::Result<()> {
    let loader = loader(config);

    match action {
        ConfigAction::Show => {
            let settings = loader.load().context("failed to load settings")?;
            print!("{}", to_toml(&settings)?);
        }
        ConfigAction::Path => {
            println!("{}", loader.config_path().display());
        }
        ConfigAction::Init { force } => {
            if loader.config_path().exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    loader.config_path().display()
                );
            }
            loader.save(&SessionSettings::default())?;
            println!(
                "{} {}",
                "Wrote default settings to".green(),
                loader.config_path().display()
            );
        }
    }
    Ok(())
}
