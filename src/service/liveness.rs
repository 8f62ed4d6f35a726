//! PID-file based liveness tracking.
//!
//! A service is Running when its PID file holds the id of a process that
//! answers a zero signal. Any other outcome leaves the service Stopped and
//! removes the PID file. The check only observes; it never signals a process
//! with anything but signal 0.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ProcessHandle, Service, ServiceState};

/// Capability to ask whether a process id refers to a live process.
pub trait ProcessProbe: Send + Sync {
    /// Returns true if the process exists and can be signaled.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probes processes with `kill(pid, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // 0 and values above i32::MAX would address process groups.
        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return false,
        };

        kill(Pid::from_raw(raw), None).is_ok()
    }
}

/// Why a PID file did not yield a live process.
#[derive(Debug)]
enum Stale {
    Missing,
    Unreadable(std::io::Error),
    Malformed(String),
    Dead(u32),
}

/// Reconciles services with their PID files.
#[derive(Clone)]
pub struct LivenessTracker {
    probe: Arc<dyn ProcessProbe>,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(Arc::new(SignalProbe))
    }
}

impl std::fmt::Debug for LivenessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessTracker").finish_non_exhaustive()
    }
}

impl LivenessTracker {
    /// Creates a tracker using the given probe.
    pub fn new(probe: Arc<dyn ProcessProbe>) -> Self {
        Self { probe }
    }

    /// Checks the service's PID file and updates its process handle.
    ///
    /// Idempotent: repeated calls only ever delete stale PID files.
    pub fn check(&self, service: &mut Service) -> ServiceState {
        match self.live_pid(&service.pid_file_path) {
            Ok(pid) => {
                service.process = Some(ProcessHandle::new(pid));
                ServiceState::Running
            }
            Err(stale) => {
                match &stale {
                    Stale::Missing => {}
                    Stale::Unreadable(e) => {
                        warn!(service = %service.name, error = %e, "Unreadable PID file")
                    }
                    Stale::Malformed(content) => {
                        debug!(service = %service.name, content = %content, "Malformed PID file")
                    }
                    Stale::Dead(pid) => {
                        debug!(service = %service.name, pid = pid, "Process is gone")
                    }
                }
                remove_pid_file(&service.pid_file_path);
                service.process = None;
                ServiceState::Stopped
            }
        }
    }

    fn live_pid(&self, pid_file: &Path) -> Result<u32, Stale> {
        let content = match std::fs::read_to_string(pid_file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Stale::Missing),
            Err(e) => return Err(Stale::Unreadable(e)),
        };

        let pid: u32 = content
            .trim()
            .parse()
            .map_err(|_| Stale::Malformed(content.clone()))?;

        if self.probe.is_alive(pid) {
            Ok(pid)
        } else {
            Err(Stale::Dead(pid))
        }
    }
}

fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale PID file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove PID file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Color;
    use std::collections::HashSet;

    struct FakeProbe {
        alive: HashSet<u32>,
    }

    impl ProcessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }

    fn service_in(dir: &Path) -> Service {
        Service::new("api", "", dir.join("api"), dir, Color::Green)
    }

    #[test]
    fn test_own_pid_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(dir.path());
        std::fs::write(&service.pid_file_path, std::process::id().to_string()).unwrap();

        let tracker = LivenessTracker::default();
        assert_eq!(tracker.check(&mut service), ServiceState::Running);
        assert_eq!(service.pid(), Some(std::process::id()));
        assert!(service.pid_file_path.exists());
    }

    #[test]
    fn test_malformed_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(dir.path());
        std::fs::write(&service.pid_file_path, "not-a-pid").unwrap();

        let tracker = LivenessTracker::default();
        assert_eq!(tracker.check(&mut service), ServiceState::Stopped);
        assert!(service.process.is_none());
        assert!(!service.pid_file_path.exists());
    }

    #[test]
    fn test_missing_pid_file_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(dir.path());

        let tracker = LivenessTracker::default();
        assert_eq!(tracker.check(&mut service), ServiceState::Stopped);
        assert_eq!(tracker.check(&mut service), ServiceState::Stopped);
    }

    #[test]
    fn test_dead_process_clears_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(dir.path());
        std::fs::write(&service.pid_file_path, "1234\n").unwrap();

        let alive = Arc::new(FakeProbe {
            alive: HashSet::from([1234]),
        });
        assert_eq!(
            LivenessTracker::new(alive).check(&mut service),
            ServiceState::Running
        );
        assert_eq!(service.pid(), Some(1234));

        let dead = Arc::new(FakeProbe {
            alive: HashSet::new(),
        });
        assert_eq!(
            LivenessTracker::new(dead).check(&mut service),
            ServiceState::Stopped
        );
        assert!(service.process.is_none());
        assert!(!service.pid_file_path.exists());
    }

    #[test]
    fn test_signal_probe_rejects_group_ids() {
        assert!(!SignalProbe.is_alive(0));
        assert!(!SignalProbe.is_alive(u32::MAX));
        assert!(SignalProbe.is_alive(std::process::id()));
    }
}
