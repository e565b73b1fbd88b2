// Command line definition and dispatch

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;

/// shellproc - run shell commands as observable, abortable sessions
#[derive(Parser, Debug)]
#[command(name = "shellproc")]
#[command(bin_name = "shellproc")]
#[command(about = "Run a shell command, stream its output and abort it cleanly")]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to <config dir>/shellproc/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command through the platform shell
    #[command(about = "Run a command; Ctrl-C aborts it and its whole process tree")]
    Run {
        /// Working directory for the command
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,

        /// Command text, passed to the shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Inspect settings
    #[command(about = "Show or initialize shellproc settings")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective settings as TOML
    Show,
    /// Print the settings file location
    Path,
    /// Write the default settings to the settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the parsed command line and return the process exit code
pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run { cwd, command } => {
            commands::run(cli.config.as_deref(), cli.verbose, cwd, &command.join(" ")).await
        }
        Commands::Config { action } => {
            commands::config(cli.config.as_deref(), action.unwrap_or(ConfigAction::Show))?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_collects_trailing_words() {
        let cli = Cli::try_parse_from(["shellproc", "run", "--cwd", "/tmp", "--", "ls", "-la", "src"]).unwrap();
        match cli.command {
            Commands::Run { cwd, command } => {
                assert_eq!(cwd, Some(PathBuf::from("/tmp")));
                assert_eq!(command, vec!["ls", "-la", "src"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["shellproc", "run"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["shellproc", "config", "show", "--verbose", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: Some(ConfigAction::Show)
            }
        ));
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::try_parse_from(["shellproc", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: Some(ConfigAction::Init { force: true })
            }
        ));
    }
}
