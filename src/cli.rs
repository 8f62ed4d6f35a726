//! Command-line interface definition for orchestra.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CommandName, LogLevel};

/// orchestra - Local multi-service supervisor
///
/// Discovers the services of a monorepo, reports their state and follows
/// their logs, running the configured hooks around every command.
#[derive(Debug, Parser)]
#[command(name = "orchestra")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "ORCHESTRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Maximum number of concurrent per-service tasks
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level forced by `-q`/`-v`, if any.
    ///
    /// `None` leaves the choice to the configuration file.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.quiet {
            return Some(LogLevel::Error);
        }

        match self.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show whether the selected services are running
    Ps(PsArgs),

    /// Follow the logs of the selected services
    Logs(SelectArgs),

    /// Print the global environment as shell export lines
    Export,

    /// List stacks, services, and selection tokens
    Services,

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Commands {
    /// Returns the hook scope of this subcommand, if it runs inside hooks.
    pub fn hook_scope(&self) -> Option<CommandName> {
        match self {
            Commands::Ps(_) => Some(CommandName::Ps),
            Commands::Logs(_) => Some(CommandName::Logs),
            Commands::Export => Some(CommandName::Export),
            Commands::Services | Commands::Config(_) => None,
        }
    }
}

/// Service selection shared by subcommands acting on services.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Services or stacks to act on; prefix with `~` to exclude, `.` for the
    /// current directory
    #[arg(value_name = "SERVICE")]
    pub services: Vec<String>,
}

/// Arguments for the `ps` subcommand.
#[derive(Debug, Args)]
pub struct PsArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the current configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug() {
        // Verify CLI can be constructed
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ps_command() {
        let cli = Cli::parse_from(["orchestra", "ps"]);

        match cli.command {
            Commands::Ps(args) => {
                assert!(args.select.services.is_empty());
                assert!(!args.json);
            }
            _ => panic!("Expected Ps command"),
        }
    }

    #[test]
    fn test_ps_with_selection() {
        let cli = Cli::parse_from(["orchestra", "ps", "~payments", "~web", "--json"]);

        match cli.command {
            Commands::Ps(args) => {
                assert_eq!(args.select.services, vec!["~payments", "~web"]);
                assert!(args.json);
            }
            _ => panic!("Expected Ps command"),
        }
    }

    #[test]
    fn test_logs_command() {
        let cli = Cli::parse_from(["orchestra", "logs", "api", "payments/"]);

        match cli.command {
            Commands::Logs(args) => {
                assert_eq!(args.services, vec!["api", "payments/"]);
            }
            _ => panic!("Expected Logs command"),
        }
    }

    #[test]
    fn test_hook_scopes() {
        let cli = Cli::parse_from(["orchestra", "export"]);
        assert_eq!(cli.command.hook_scope(), Some(CommandName::Export));

        let cli = Cli::parse_from(["orchestra", "logs"]);
        assert_eq!(cli.command.hook_scope(), Some(CommandName::Logs));

        let cli = Cli::parse_from(["orchestra", "services"]);
        assert_eq!(cli.command.hook_scope(), None);

        let cli = Cli::parse_from(["orchestra", "config", "show"]);
        assert_eq!(cli.command.hook_scope(), None);
    }

    #[test]
    fn test_config_validate() {
        let cli = Cli::parse_from(["orchestra", "config", "validate"]);

        match cli.command {
            Commands::Config(ConfigCommands::Validate) => {}
            _ => panic!("Expected Config Validate command"),
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from(["orchestra", "-c", "/work/orchestra.yml", "ps", "-j", "3"]);

        assert_eq!(cli.config, Some(PathBuf::from("/work/orchestra.yml")));
        assert_eq!(cli.jobs, Some(3));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        assert!(Cli::try_parse_from(["orchestra", "-j", "0", "ps"]).is_err());
    }

    #[test]
    fn test_verbose_levels() {
        let cli = Cli::parse_from(["orchestra", "ps"]);
        assert_eq!(cli.log_level(), None);

        let cli = Cli::parse_from(["orchestra", "-v", "ps"]);
        assert_eq!(cli.log_level(), Some(LogLevel::Debug));

        let cli = Cli::parse_from(["orchestra", "-vvv", "ps"]);
        assert_eq!(cli.log_level(), Some(LogLevel::Trace));
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["orchestra", "-q", "ps"]);
        assert_eq!(cli.log_level(), Some(LogLevel::Error));

        assert!(Cli::try_parse_from(["orchestra", "-q", "-v", "ps"]).is_err());
    }
}
