//! Configuration module for orchestra.
//!
//! This module provides the project configuration (`orchestra.yml`) and its
//! loading functionality. The project root is the directory that contains the
//! configuration file.

mod env;
mod logging;

pub use env::EnvVars;
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{OrchestraError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "orchestra.yml";

/// Environment variable for configuration file path.
pub const ENV_CONFIG_PATH: &str = "ORCHESTRA_CONFIG";

/// Name of the project-local state directory.
pub const STATE_DIR_NAME: &str = ".orchestra";

/// Commands that may carry their own hook and environment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    Build,
    Export,
    Install,
    Logs,
    Ps,
    Restart,
    Start,
    Stop,
    Test,
}

impl CommandName {
    /// Every supported command, in alphabetical order.
    pub const ALL: [CommandName; 9] = [
        CommandName::Build,
        CommandName::Export,
        CommandName::Install,
        CommandName::Logs,
        CommandName::Ps,
        CommandName::Restart,
        CommandName::Start,
        CommandName::Stop,
        CommandName::Test,
    ];

    /// Returns the command name as written in the configuration file.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Build => "build",
            CommandName::Export => "export",
            CommandName::Install => "install",
            CommandName::Logs => "logs",
            CommandName::Ps => "ps",
            CommandName::Restart => "restart",
            CommandName::Start => "start",
            CommandName::Stop => "stop",
            CommandName::Test => "test",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = OrchestraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| OrchestraError::config(format!("Unknown command: {}", s)))
    }
}

/// Hooks and environment for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Scope environment variables.
    #[serde(skip_serializing_if = "EnvVars::is_empty")]
    pub env: EnvVars,

    /// Command lines run before the command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,

    /// Command lines run after the command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

/// Project configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectConfig {
    /// Global hooks and environment.
    #[serde(flatten)]
    pub global: ContextConfig,

    /// Stack subdirectories. Empty means a single top-level stack.
    pub stacks: Vec<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Capacity of the bounded executor.
    pub workers: usize,

    /// Per-command overrides.
    #[serde(flatten)]
    pub commands: BTreeMap<CommandName, ContextConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            global: ContextConfig::default(),
            stacks: Vec::new(),
            logging: LoggingConfig::default(),
            workers: default_workers(),
            commands: BTreeMap::new(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// On-disk layout of `orchestra.yml`.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawProjectConfig {
    env: EnvVars,
    before: Vec<String>,
    after: Vec<String>,
    stacks: Vec<String>,
    logging: LoggingConfig,
    workers: usize,
    build: Option<ContextConfig>,
    export: Option<ContextConfig>,
    install: Option<ContextConfig>,
    logs: Option<ContextConfig>,
    ps: Option<ContextConfig>,
    restart: Option<ContextConfig>,
    start: Option<ContextConfig>,
    stop: Option<ContextConfig>,
    test: Option<ContextConfig>,
}

impl Default for RawProjectConfig {
    fn default() -> Self {
        Self {
            env: EnvVars::default(),
            before: Vec::new(),
            after: Vec::new(),
            stacks: Vec::new(),
            logging: LoggingConfig::default(),
            workers: default_workers(),
            build: None,
            export: None,
            install: None,
            logs: None,
            ps: None,
            restart: None,
            start: None,
            stop: None,
            test: None,
        }
    }
}

impl From<RawProjectConfig> for ProjectConfig {
    fn from(raw: RawProjectConfig) -> Self {
        let commands = [
            (CommandName::Build, raw.build),
            (CommandName::Export, raw.export),
            (CommandName::Install, raw.install),
            (CommandName::Logs, raw.logs),
            (CommandName::Ps, raw.ps),
            (CommandName::Restart, raw.restart),
            (CommandName::Start, raw.start),
            (CommandName::Stop, raw.stop),
            (CommandName::Test, raw.test),
        ]
        .into_iter()
        .filter_map(|(name, block)| block.map(|block| (name, block)))
        .collect();

        Self {
            global: ContextConfig {
                env: raw.env,
                before: raw.before,
                after: raw.after,
            },
            stacks: raw.stacks,
            logging: raw.logging,
            workers: raw.workers,
            commands,
        }
    }
}

impl ProjectConfig {
    /// Loads configuration from a YAML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestraError::config_with_source(
                format!("Failed to read config file: {}", path.display()),
                e,
            )
        })?;

        let raw: RawProjectConfig = serde_yaml::from_str(&content).map_err(|e| {
            OrchestraError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        let config = ProjectConfig::from(raw);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let raw: RawProjectConfig = serde_yaml::from_str(content)
            .map_err(|e| OrchestraError::config_with_source("Failed to parse config", e))?;

        let config = ProjectConfig::from(raw);
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration file path with the following priority:
    /// 1. Explicit path (if provided)
    /// 2. ORCHESTRA_CONFIG environment variable
    /// 3. The nearest `orchestra.yml` in `cwd` or one of its ancestors
    ///
    /// Falls back to `orchestra.yml` in `cwd`, which the caller will fail to
    /// load if it does not exist.
    pub fn resolve_path(explicit_path: Option<&Path>, cwd: &Path) -> PathBuf {
        let path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => match std::env::var(ENV_CONFIG_PATH) {
                Ok(env_path) if !env_path.is_empty() => PathBuf::from(env_path),
                _ => Self::find_upward(cwd).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            },
        };

        if path.is_absolute() {
            path
        } else {
            cwd.join(path)
        }
    }

    /// Searches `start` and its ancestors for `orchestra.yml`.
    pub fn find_upward(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(OrchestraError::config("workers must be at least 1"));
        }

        let scopes = std::iter::once(("global".to_string(), &self.global)).chain(
            self.commands
                .iter()
                .map(|(name, block)| (name.to_string(), block)),
        );
        for (scope, block) in scopes {
            for line in block.before.iter().chain(block.after.iter()) {
                if line.trim().is_empty() {
                    return Err(OrchestraError::config(format!(
                        "Empty hook command line in {} scope",
                        scope
                    )));
                }
            }
        }

        Ok(())
    }

    /// Returns the override block for a command, if configured.
    pub fn command(&self, name: CommandName) -> Option<&ContextConfig> {
        self.commands.get(&name)
    }

    /// Returns the global environment variables.
    pub fn env(&self) -> &EnvVars {
        &self.global.env
    }

    /// Returns the stack directories to discover.
    ///
    /// An empty list means a single implicit top-level stack.
    pub fn stack_paths(&self) -> Vec<String> {
        if self.stacks.is_empty() {
            vec![String::new()]
        } else {
            self.stacks.clone()
        }
    }
}
