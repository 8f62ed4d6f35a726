//! Supervisor context.
//!
//! [`Supervisor`] owns everything one invocation works on: the loaded
//! configuration, the project paths, the service registry, the liveness
//! tracker, the hook pipeline, and the shared error collector. Components get
//! what they need from it by reference; there is no process-wide state.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ProjectConfig, STATE_DIR_NAME};
use crate::error::{ErrorCollector, OrchestraError, Result};
use crate::executor::WorkerPool;
use crate::hooks::HookPipeline;
use crate::logs::{LogAggregator, LINE_BUFFER};
use crate::registry::{discover, select, Registry, SelectionMode};
use crate::service::{LivenessTracker, Service, ServiceStatus};

/// Per-invocation supervisor state.
#[derive(Debug)]
pub struct Supervisor {
    config: Arc<ProjectConfig>,
    project_root: PathBuf,
    state_dir: PathBuf,
    registry: Registry,
    tracker: LivenessTracker,
    hooks: HookPipeline,
    errors: ErrorCollector,
}

impl Supervisor {
    /// Loads the configuration at `config_path`, prepares the state directory
    /// and discovers every service.
    ///
    /// The project root is the directory holding the configuration file.
    pub fn bootstrap(config_path: &Path) -> Result<Self> {
        let config = ProjectConfig::load_from_path(config_path)?;
        Self::bootstrap_with(config, config_path, LivenessTracker::default())
    }

    /// Same as [`Supervisor::bootstrap`] with an already loaded configuration.
    pub fn bootstrap_with(
        config: ProjectConfig,
        config_path: &Path,
        tracker: LivenessTracker,
    ) -> Result<Self> {
        let root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let project_root = root.canonicalize().map_err(|e| {
            OrchestraError::config_with_source(
                format!("Project root not accessible: {}", root.display()),
                e,
            )
        })?;

        let state_dir = project_root.join(STATE_DIR_NAME);
        std::fs::create_dir_all(&state_dir)?;

        let registry = discover(&project_root, &state_dir, &config.stack_paths(), &tracker);
        info!(
            root = %project_root.display(),
            services = registry.len(),
            stacks = registry.stack_names().len(),
            "Discovered services"
        );

        Ok(Self::new(config, project_root, state_dir, registry, tracker))
    }

    /// Builds a supervisor from already prepared parts.
    pub fn new(
        config: ProjectConfig,
        project_root: PathBuf,
        state_dir: PathBuf,
        registry: Registry,
        tracker: LivenessTracker,
    ) -> Self {
        let config = Arc::new(config);
        let errors = ErrorCollector::new();
        let hooks = HookPipeline::new(Arc::clone(&config), errors.clone()).working_dir(&project_root);
        Self {
            config,
            project_root,
            state_dir,
            registry,
            tracker,
            hooks,
            errors,
        }
    }

    /// Returns the loaded configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Returns the canonical project root.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the state directory holding PID and log files.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Returns the registry of selected services.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the hook pipeline.
    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    /// Returns the shared error collector.
    pub fn errors(&self) -> &ErrorCollector {
        &self.errors
    }

    /// Narrows the registry to the services picked by `tokens`.
    ///
    /// `cwd` resolves the `.` token.
    pub fn select<S: AsRef<str>>(&mut self, tokens: &[S], cwd: &Path) -> Result<SelectionMode> {
        let mode = select(&mut self.registry, tokens, &self.project_root, cwd)?;
        debug!(mode = ?mode, selected = self.registry.len(), "Selection applied");
        Ok(mode)
    }

    /// Re-checks the liveness of every selected service and returns their
    /// status sorted by name.
    ///
    /// One check per service is fanned out through the bounded executor. Each
    /// task owns a copy of its service and sends it back once checked.
    pub async fn refresh_status(&mut self) -> Vec<ServiceStatus> {
        let pool = WorkerPool::new(self.config.workers);
        let expected = self.registry.len();
        let (tx, mut rx) = mpsc::channel::<Service>(expected.max(1));

        for service in self.registry.services() {
            let mut service = service.clone();
            let tracker = self.tracker.clone();
            let tx = tx.clone();
            pool.submit(async move {
                tracker.check(&mut service);
                let _ = tx.send(service).await;
            })
            .await;
        }
        drop(tx);

        // Counting barrier: a panicking task closes its sender without a result.
        let mut received = 0;
        while received < expected {
            let Some(service) = rx.recv().await else {
                warn!(expected, received, "Status checks ended early");
                break;
            };
            if let Some(slot) = self.registry.get_mut(&service.name) {
                slot.process = service.process;
            }
            received += 1;
        }
        pool.drain().await;

        self.registry.sorted().into_iter().map(Service::status).collect()
    }

    /// Tails the log of every selected service into `out` until `until`
    /// resolves.
    ///
    /// Lines are prefixed with the service name padded to the longest
    /// discovered name.
    pub async fn tail_logs<W, F>(&self, mut out: W, until: F) -> Result<()>
    where
        W: Write + Send + 'static,
        F: Future<Output = ()>,
    {
        let (mut aggregator, mut rx) = LogAggregator::new(LINE_BUFFER);
        let width = self.registry.max_name_len();
        for service in self.registry.sorted() {
            aggregator.tail(service, width);
        }

        let consumer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                writeln!(out, "{}", line)?;
                out.flush()?;
            }
            Ok::<_, std::io::Error>(())
        });

        until.await;
        info!(producers = aggregator.producers(), "Stopping log tailing");
        aggregator.shutdown().await;

        match consumer.await {
            Ok(result) => result.map_err(OrchestraError::from),
            Err(e) => Err(OrchestraError::Io(std::io::Error::other(e))),
        }
    }

    /// Returns `export KEY=VALUE` lines for the global environment, in
    /// declaration order.
    pub fn export_lines(&self) -> Vec<String> {
        self.config
            .env()
            .to_pairs()
            .into_iter()
            .map(|pair| format!("export {}", pair))
            .collect()
    }

    /// Returns every valid selection token: stacks, service names, and their
    /// excluded forms.
    pub fn completion_candidates(&self) -> Vec<String> {
        let names: Vec<String> = self
            .registry
            .stack_names()
            .into_iter()
            .chain(self.registry.names())
            .collect();
        let excluded: Vec<String> = names.iter().map(|name| format!("~{}", name)).collect();
        names.into_iter().chain(excluded).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ProcessProbe, ServiceState, MANIFEST_FILE};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn create_project(config: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        for rel in ["api", "web", "payments/api", "payments/worker"] {
            let service = dir.path().join(rel);
            fs::create_dir_all(&service).unwrap();
            fs::write(service.join(MANIFEST_FILE), "").unwrap();
        }
        let config_path = dir.path().join("orchestra.yml");
        fs::write(&config_path, config).unwrap();
        (dir, config_path)
    }

    /// Shared buffer usable as the `logs` output.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct OnlyPid(u32);

    impl ProcessProbe for OnlyPid {
        fn is_alive(&self, pid: u32) -> bool {
            pid == self.0
        }
    }

    #[test]
    fn test_bootstrap_discovers_stacks() {
        let (dir, config_path) = create_project("stacks:\n  - .\n  - payments\nworkers: 2\n");
        let supervisor = Supervisor::bootstrap(&config_path).unwrap();

        assert_eq!(
            supervisor.registry().names(),
            vec!["api", "payments/api", "payments/worker", "web"]
        );
        assert!(supervisor.state_dir().is_dir());
        assert_eq!(
            supervisor.project_root(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_bootstrap_missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Supervisor::bootstrap(&dir.path().join("orchestra.yml")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_refresh_status_after_selection() {
        let (_dir, config_path) = create_project("stacks: [\"\", payments]\nworkers: 1\n");
        let config = ProjectConfig::load_from_path(&config_path).unwrap();
        let tracker = LivenessTracker::new(Arc::new(OnlyPid(4242)));
        let mut supervisor = Supervisor::bootstrap_with(config, &config_path, tracker).unwrap();

        let pid_file = supervisor.state_dir().join("payments_worker.pid");
        fs::write(&pid_file, "4242").unwrap();
        fs::write(supervisor.state_dir().join("payments_api.pid"), "17").unwrap();

        let root = supervisor.project_root().to_path_buf();
        supervisor.select(&["payments"], &root).unwrap();
        let statuses = supervisor.refresh_status().await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "payments/api");
        assert_eq!(statuses[0].state, ServiceState::Stopped);
        assert_eq!(statuses[1].name, "payments/worker");
        assert_eq!(statuses[1].state, ServiceState::Running);
        assert_eq!(statuses[1].pid, Some(4242));
        assert!(!supervisor.state_dir().join("payments_api.pid").exists());
        assert!(pid_file.exists());
    }

    #[tokio::test]
    async fn test_refresh_status_empty_registry() {
        let (_dir, config_path) = create_project("stacks: [missing]\n");
        let mut supervisor = Supervisor::bootstrap(&config_path).unwrap();

        assert!(supervisor.refresh_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_tail_logs_until_stopped() {
        let (_dir, config_path) = create_project("workers: 2\n");
        let mut supervisor = Supervisor::bootstrap(&config_path).unwrap();
        let root = supervisor.project_root().to_path_buf();
        supervisor.select(&["api"], &root).unwrap();

        let log = supervisor.registry().get("api").unwrap().log_file_path.clone();
        fs::write(&log, "").unwrap();

        let buffer = SharedBuffer::default();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let writer = {
            let log = log.clone();
            tokio::spawn(async move {
                tokio::time::sleep(crate::logs::POLL_INTERVAL * 2).await;
                fs::write(&log, "booted\n").unwrap();
                tokio::time::sleep(crate::logs::POLL_INTERVAL * 4).await;
                let _ = stop_tx.send(());
            })
        };

        tokio::time::timeout(
            Duration::from_secs(10),
            supervisor.tail_logs(buffer.clone(), async {
                let _ = stop_rx.await;
            }),
        )
        .await
        .unwrap()
        .unwrap();
        writer.await.unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("api"));
        assert!(output.trim_end().ends_with("|  booted"));
    }

    #[test]
    fn test_export_lines_keep_order() {
        let (_dir, config_path) = create_project("env:\n  ZED: last\n  ALPHA: 1\n");
        let supervisor = Supervisor::bootstrap(&config_path).unwrap();

        assert_eq!(
            supervisor.export_lines(),
            vec!["export ZED=last", "export ALPHA=1"]
        );
    }

    #[test]
    fn test_completion_candidates() {
        let (_dir, config_path) = create_project("stacks: [\"\", payments]\n");
        let supervisor = Supervisor::bootstrap(&config_path).unwrap();

        let candidates = supervisor.completion_candidates();
        assert_eq!(candidates[0], "payments");
        assert!(candidates.contains(&"payments/worker".to_string()));
        assert!(candidates.contains(&"~payments".to_string()));
        assert!(candidates.contains(&"~web".to_string()));
        assert_eq!(candidates.len(), 10);
    }
}
