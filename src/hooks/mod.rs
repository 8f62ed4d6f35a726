//! Hook and environment pipeline.
//!
//! Every command runs as `before hooks → action → after hooks`. Hooks are
//! plain command lines split on whitespace (no shell, no quoting) and run with
//! the composed environment:
//!
//! 1. the inherited OS environment,
//! 2. overridden by the global `env` block,
//! 3. overridden by the command's own `env` block,
//! 4. overridden by a service manifest's `env`, when a service is involved.
//!
//! Hook failures are recorded in the shared [`ErrorCollector`] and never stop
//! the wrapped action from running.


use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{CommandName, EnvVars, ProjectConfig};
use crate::error::{ErrorCollector, HookPhase, OrchestraError, Result};
use crate::service::Service;

/// Runs hooks around commands and composes their environment.
#[derive(Debug, Clone)]
pub struct HookPipeline {
    config: Arc<ProjectConfig>,
    base_env: Arc<EnvVars>,
    working_dir: Option<PathBuf>,
    errors: ErrorCollector,
}

impl HookPipeline {
    /// Creates a pipeline on top of the current process environment.
    pub fn new(config: Arc<ProjectConfig>, errors: ErrorCollector) -> Self {
        Self::with_base_env(config, errors, std::env::vars())
    }

    /// Creates a pipeline on top of an explicit base environment.
    pub fn with_base_env<I, K, V>(config: Arc<ProjectConfig>, errors: ErrorCollector, base: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            config,
            base_env: Arc::new(base.into_iter().collect()),
            working_dir: None,
            errors,
        }
    }

    /// Runs hook command lines from `dir` instead of the current directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the shared error collector.
    pub fn errors(&self) -> &ErrorCollector {
        &self.errors
    }

    /// Composes the environment for `command`.
    pub fn compose_env(&self, command: CommandName) -> EnvVars {
        let mut env = (*self.base_env).clone();
        for (key, value) in self.config.env().iter() {
            env.insert(key, value);
        }
        if let Some(scope) = self.config.command(command) {
            for (key, value) in scope.env.iter() {
                env.insert(key, value);
            }
        }
        env
    }

    /// Composes the environment for `command` acting on `service`.
    pub fn compose_service_env(&self, command: CommandName, service: &Service) -> EnvVars {
        let mut env = self.compose_env(command);
        for (key, value) in service.env.iter() {
            env.insert(key, value);
        }
        env
    }

    /// Runs the global, then the command's `before` lines.
    ///
    /// Failures are recorded in the collector; the first one is also
    /// returned.
    pub async fn run_before(&self, command: CommandName) -> Result<()> {
        let scoped = self.config.command(command).map(|c| c.before.as_slice());
        self.run_phase(command, HookPhase::Before, &self.config.global.before, scoped)
            .await
    }

    /// Runs the global, then the command's `after` lines.
    ///
    /// Failures are recorded in the collector; the first one is also
    /// returned.
    pub async fn run_after(&self, command: CommandName) -> Result<()> {
        let scoped = self.config.command(command).map(|c| c.after.as_slice());
        self.run_phase(command, HookPhase::After, &self.config.global.after, scoped)
            .await
    }

    /// Runs `action` between the before and after hooks of `command`.
    ///
    /// The action always runs, and after hooks always run, whatever the hooks
    /// or the action report. Non-fatal action errors are recorded and yield
    /// `Ok(None)`. A fatal error is returned at once without running the
    /// after hooks.
    pub async fn wrap<T, Fut>(&self, command: CommandName, action: Fut) -> Result<Option<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _ = self.run_before(command).await;

        let outcome = match action.await {
            Ok(value) => Some(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.errors.record(e);
                None
            }
        };

        let _ = self.run_after(command).await;
        Ok(outcome)
    }

    async fn run_phase(
        &self,
        command: CommandName,
        phase: HookPhase,
        global: &[String],
        scoped: Option<&[String]>,
    ) -> Result<()> {
        let env = self.compose_env(command);
        let mut first_error = None;

        for lines in std::iter::once(global).chain(scoped) {
            // A failing line skips the rest of its own list only.
            if let Err(e) = self.run_lines(lines, phase, &env).await {
                self.errors.record(clone_hook_error(&e));
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_lines(&self, lines: &[String], phase: HookPhase, env: &EnvVars) -> Result<()> {
        for line in lines {
            self.run_line(line, phase, env).await?;
        }
        Ok(())
    }

    async fn run_line(&self, line: &str, phase: HookPhase, env: &EnvVars) -> Result<()> {
        let mut parts = line.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };

        info!(phase = %phase, command = line, "Running hook");

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let status = cmd
            .status()
            .await
            .map_err(|e| OrchestraError::spawn(program, e))?;

        debug!(phase = %phase, command = line, status = %status, "Hook finished");
        if status.success() {
            Ok(())
        } else {
            Err(OrchestraError::hook(line, phase, status))
        }
    }
}

/// Copies a hook failure so it can be both recorded and returned.
fn clone_hook_error(error: &OrchestraError) -> OrchestraError {
    match error {
        OrchestraError::Hook {
            command,
            phase,
            status,
        } => OrchestraError::Hook {
            command: command.clone(),
            phase: *phase,
            status: status.clone(),
        },
        OrchestraError::Spawn { program, source } => OrchestraError::Spawn {
            program: program.clone(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
        other => OrchestraError::hook("hook", HookPhase::Before, other),
    }
}
