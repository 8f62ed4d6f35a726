//! orchestra - Local multi-service supervisor
//!
//! Entry point for the orchestra application.

use clap::Parser;
use orchestra::cli::{Cli, Commands, ConfigCommands, PsArgs, SelectArgs};
use orchestra::config::{CommandName, LogFormat, LogLevel, LoggingConfig, ProjectConfig};
use orchestra::error::exit_code;
use orchestra::service::{LivenessTracker, ServiceState};
use orchestra::{OrchestraError, Supervisor};
use std::path::Path;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_code::CLI_ERROR
            } else {
                exit_code::SUCCESS
            };
            let _ = e.print();
            return ExitCode::from(code as u8);
        }
    };

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("Failed to read current directory: {}", e);
            return ExitCode::from(exit_code::GENERAL_ERROR as u8);
        }
    };
    let config_path = ProjectConfig::resolve_path(cli.config.as_deref(), &cwd);
    let config = ProjectConfig::load_from_path(&config_path);

    // Logging is set up from the configuration when it loads, so a broken
    // file is still reported through the subscriber.
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = init_logging(cli.log_level(), &logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    if let (Err(e), Commands::Config(ConfigCommands::Validate)) = (&config, &cli.command) {
        println!("✗ Configuration is invalid: {}", e);
        return ExitCode::from(e.exit_code() as u8);
    }

    let result = config.and_then(|mut config| {
        if let Some(jobs) = cli.jobs {
            config.workers = usize::from(jobs);
        }
        run(&cli, config, &config_path, &cwd)
    });

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the tracing subscriber.
///
/// `-q`/`-v` win over the configured level; `RUST_LOG` wins over both.
fn init_logging(
    forced: Option<LogLevel>,
    logging: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = tracing::Level::from(forced.unwrap_or(logging.level));
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
}

/// Main application logic. Returns the process exit code.
fn run(cli: &Cli, config: ProjectConfig, config_path: &Path, cwd: &Path) -> orchestra::Result<i32> {
    if let Commands::Config(subcmd) = &cli.command {
        cmd_config(subcmd, &config, config_path)?;
        return Ok(exit_code::SUCCESS);
    }

    let mut supervisor =
        Supervisor::bootstrap_with(config, config_path, LivenessTracker::default())?;

    let runtime = tokio::runtime::Runtime::new()?;
    tracing::debug!(scope = ?cli.command.hook_scope(), "Running command");

    runtime.block_on(async {
        match &cli.command {
            Commands::Ps(args) => cmd_ps(&mut supervisor, args, cwd).await,
            Commands::Logs(args) => cmd_logs(&mut supervisor, args, cwd).await,
            Commands::Export => cmd_export(&supervisor).await,
            Commands::Services => {
                cmd_services(&supervisor);
                Ok(())
            }
            Commands::Config(_) => Ok(()),
        }
    })?;

    Ok(supervisor.errors().exit_code())
}

/// Handle the `ps` command.
async fn cmd_ps(supervisor: &mut Supervisor, args: &PsArgs, cwd: &Path) -> orchestra::Result<()> {
    let hooks = supervisor.hooks().clone();
    hooks
        .wrap(CommandName::Ps, async {
            supervisor.select(&args.select.services, cwd)?;
            let statuses = supervisor.refresh_status().await;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
                return Ok(());
            }

            let width = supervisor.registry().max_name_len();
            for status in &statuses {
                let label = match supervisor.registry().get(&status.name) {
                    Some(service) => service.label(width),
                    None => format!("{:width$}", status.name, width = width),
                };
                match (status.state, status.pid) {
                    (ServiceState::Running, Some(pid)) => println!("{}  running {}", label, pid),
                    _ => println!("{}  stopped", label),
                }
            }
            Ok(())
        })
        .await?;
    Ok(())
}

/// Handle the `logs` command. Runs until Ctrl-C.
async fn cmd_logs(supervisor: &mut Supervisor, args: &SelectArgs, cwd: &Path) -> orchestra::Result<()> {
    let hooks = supervisor.hooks().clone();
    hooks
        .wrap(CommandName::Logs, async {
            supervisor.select(&args.services, cwd)?;
            tracing::info!(services = supervisor.registry().len(), "Following logs, press Ctrl-C to stop");

            supervisor
                .tail_logs(std::io::stdout(), async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await
        })
        .await?;
    Ok(())
}

/// Handle the `export` command.
async fn cmd_export(supervisor: &Supervisor) -> orchestra::Result<()> {
    supervisor
        .hooks()
        .wrap(CommandName::Export, async {
            for line in supervisor.export_lines() {
                println!("{}", line);
            }
            Ok(())
        })
        .await?;
    Ok(())
}

/// Handle the `services` command.
fn cmd_services(supervisor: &Supervisor) {
    for candidate in supervisor.completion_candidates() {
        println!("{}", candidate);
    }
}

/// Handle the `config` subcommand.
fn cmd_config(
    subcmd: &ConfigCommands,
    config: &ProjectConfig,
    config_path: &Path,
) -> orchestra::Result<()> {
    match subcmd {
        ConfigCommands::Validate => {
            println!("✓ Configuration is valid: {}", config_path.display());
            tracing::debug!(?config, "Validated configuration");
            Ok(())
        }
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(config).map_err(|e| {
                OrchestraError::config_with_source("Failed to serialize configuration", e)
            })?;
            println!("{}", yaml);
            Ok(())
        }
    }
}
