//! Session settings and their loader
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `SHELLPROC_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shellproc_process::{LaunchConfig, ShellSpec, DEFAULT_UTF8_LOCALE};
use tracing::debug;

use crate::error::{Result, SessionError};

/// Shell override, e.g. `program = "/bin/bash"`, `args = ["-c"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOverride {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl From<ShellOverride> for ShellSpec {
    fn from(value: ShellOverride) -> Self {
        ShellSpec::new(value.program, value.args)
    }
}

/// Tunables for a [`ShellSession`](crate::ShellSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Minimum gap between two pushed line notifications
    pub throttle_interval_ms: u64,
    /// Idle window before the session stops being hot
    pub hot_timeout_normal_ms: u64,
    /// Idle window while output looks like a compile step
    pub hot_timeout_compiling_ms: u64,
    /// Process-tree samples taken to find the command PID
    pub pid_resolve_attempts: u32,
    /// Base delay between samples (attempt n waits n × base)
    pub pid_resolve_base_delay_ms: u64,
    /// How long an aborted run waits for the shell before a last kill
    pub abort_kill_timeout_ms: u64,
    /// Timeout for the external tree-kill utility
    pub tree_kill_timeout_ms: u64,
    /// Value forced into `LANG` and `LC_ALL`
    pub locale: String,
    /// Shell to use instead of the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<ShellOverride>,
    /// Log filter level used by front ends
    pub log_level: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 500,
            hot_timeout_normal_ms: 2_000,
            hot_timeout_compiling_ms: 15_000,
            pid_resolve_attempts: 5,
            pid_resolve_base_delay_ms: 50,
            abort_kill_timeout_ms: 5_000,
            tree_kill_timeout_ms: 5_000,
            locale: DEFAULT_UTF8_LOCALE.to_string(),
            shell: None,
            log_level: "info".to_string(),
        }
    }
}

impl SessionSettings {
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn hot_timeout_normal(&self) -> Duration {
        Duration::from_millis(self.hot_timeout_normal_ms)
    }

    pub fn hot_timeout_compiling(&self) -> Duration {
        Duration::from_millis(self.hot_timeout_compiling_ms)
    }

    pub fn pid_resolve_base_delay(&self) -> Duration {
        Duration::from_millis(self.pid_resolve_base_delay_ms)
    }

    pub fn abort_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.abort_kill_timeout_ms)
    }

    pub fn tree_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.tree_kill_timeout_ms)
    }

    /// Reject settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.throttle_interval_ms == 0 {
            return Err(SessionError::Validation(
                "throttle_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.pid_resolve_attempts == 0 {
            return Err(SessionError::Validation(
                "pid_resolve_attempts must be greater than 0".to_string(),
            ));
        }
        if self.locale.trim().is_empty() {
            return Err(SessionError::Validation(
                "locale must not be empty".to_string(),
            ));
        }
        if let Some(shell) = &self.shell {
            if shell.program.trim().is_empty() {
                return Err(SessionError::Validation(
                    "shell.program must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Launch configuration for a command run in `cwd`
    pub fn launch_config(&self, cwd: Option<&Path>) -> LaunchConfig {
        let mut launch = LaunchConfig::new().locale(self.locale.clone());
        if let Some(shell) = self.shell.clone() {
            launch = launch.shell(shell.into());
        }
        if let Some(dir) = cwd {
            launch = launch.working_dir(dir);
        }
        launch
    }
}

/// Loads [`SessionSettings`] from file and environment
pub struct SettingsLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Load from a specific file instead of the default location
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: "SHELLPROC".to_string(),
        }
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shellproc")
            .join("config.toml")
    }

    /// Build, deserialize and validate the layered settings
    pub fn load(&self) -> Result<SessionSettings> {
        let settings: SessionSettings = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!(path = %self.config_path.display(), "Loaded session settings");
        Ok(settings)
    }

    /// Write `settings` as TOML to the configured path
    pub fn save(&self, settings: &SessionSettings) -> Result<()> {
        let toml = to_toml(settings)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Render settings as TOML
pub fn to_toml(settings: &SessionSettings) -> Result<String> {
    Ok(toml::to_string(settings)?)
}
