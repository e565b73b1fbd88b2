//! Launch configuration for shell commands

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ProcessError, Result};

/// Locale forced on every launched shell unless overridden
pub const DEFAULT_UTF8_LOCALE: &str = "en_US.UTF-8";

/// Shell program plus the flag that makes it execute a command string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    /// Shell executable
    pub program: String,
    /// Arguments placed before the command text
    pub args: Vec<String>,
}

impl ShellSpec {
    /// Create a shell spec from a program and its leading arguments
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Platform default shell
    ///
    /// - Windows: `%ComSpec%` (or `cmd.exe`) with `/d /s /c`
    /// - Unix: `/bin/sh -c`
    pub fn platform_default() -> Self {
        #[cfg(windows)]
        {
            let program = std::env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".to_string());
            return Self::new(program, ["/d", "/s", "/c"]);
        }

        #[cfg(not(windows))]
        {
            Self::new("/bin/sh", ["-c"])
        }
    }
}

impl Default for ShellSpec {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Configuration for launching a shell command
///
/// Stdin is always attached to the null device and stdout/stderr are always
/// merged into a single stream; neither is configurable.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Shell used to interpret the command text
    pub shell: ShellSpec,
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables (added to the parent env)
    pub env: HashMap<String, String>,
    /// Locale written to `LANG` and `LC_ALL`
    pub locale: String,
}

impl LaunchConfig {
    /// Create a launch configuration with the platform shell
    pub fn new() -> Self {
        Self {
            shell: ShellSpec::platform_default(),
            working_dir: None,
            env: HashMap::new(),
            locale: DEFAULT_UTF8_LOCALE.to_string(),
        }
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the shell
    pub fn shell(mut self, shell: ShellSpec) -> Self {
        self.shell = shell;
        self
    }

    /// Override the forced locale
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Environment applied on top of the inherited one.
    ///
    /// Locale variables win over anything in `env`.
    pub fn effective_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert("LANG".to_string(), self.locale.clone());
        env.insert("LC_ALL".to_string(), self.locale.clone());
        env
    }

    /// Check the configuration before spawning
    pub fn validate(&self) -> Result<()> {
        if self.shell.program.trim().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "shell program must not be empty".to_string(),
            ));
        }
        if self.locale.trim().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "locale must not be empty".to_string(),
            ));
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(ProcessError::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new()
    }
}
