//! Service module - the unit of supervision.
//!
//! A service is one directory of a stack that carries a `service.yml`
//! manifest. This module defines the service model, its manifest, and the
//! PID-file based liveness tracker.

pub mod liveness;
pub mod manifest;

use crate::config::EnvVars;
use owo_colors::{AnsiColors, OwoColorize};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use liveness::{LivenessTracker, ProcessProbe, SignalProbe};
pub use manifest::{ServiceManifest, MANIFEST_FILE};

/// Display color assigned to a service at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    White,
}

impl Color {
    /// Palette cycled through in discovery order.
    pub const PALETTE: [Color; 6] = [
        Color::Green,
        Color::Blue,
        Color::Cyan,
        Color::Magenta,
        Color::Yellow,
        Color::White,
    ];

    /// Returns the palette entry for the `index`-th discovered service.
    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    /// Renders `text` in this color when stdout is a terminal, plain
    /// otherwise.
    pub fn paint(&self, text: &str) -> String {
        self.render(text, stdout_is_terminal())
    }

    /// Renders `text`, with ANSI color codes only when `colored` is set.
    pub fn render(&self, text: &str, colored: bool) -> String {
        if colored {
            text.color(AnsiColors::from(*self)).to_string()
        } else {
            text.to_string()
        }
    }
}

fn stdout_is_terminal() -> bool {
    static IS_TERMINAL: OnceLock<bool> = OnceLock::new();
    *IS_TERMINAL.get_or_init(|| std::io::stdout().is_terminal())
}

impl From<Color> for AnsiColors {
    fn from(color: Color) -> Self {
        match color {
            Color::Green => AnsiColors::Green,
            Color::Blue => AnsiColors::Blue,
            Color::Cyan => AnsiColors::Cyan,
            Color::Magenta => AnsiColors::Magenta,
            Color::Yellow => AnsiColors::Yellow,
            Color::White => AnsiColors::White,
        }
    }
}

/// Observed state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// A live process is attached.
    Running,
    /// No known live process.
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Handle to a live OS process, obtained from a successful liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// Returns the process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Status snapshot of a service, as reported by `ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Stack the service belongs to, empty for top-level services.
    pub stack: String,
    /// Current state.
    pub state: ServiceState,
    /// Process id when running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// A discovered service.
#[derive(Debug, Clone)]
pub struct Service {
    /// Unique name, the path relative to the project root (e.g. `payments/api`).
    pub name: String,
    /// Stack name, empty for top-level services.
    pub stack: String,
    /// Absolute path of the service sources.
    pub path: PathBuf,
    /// Display color.
    pub color: Color,
    /// Log file written by the running service.
    pub log_file_path: PathBuf,
    /// PID file of the last started process.
    pub pid_file_path: PathBuf,
    /// Location of the built binary.
    pub bin_path: PathBuf,
    /// Environment declared in the manifest.
    pub env: EnvVars,
    /// Manifest description, if any.
    pub description: Option<String>,
    /// Live process, set only by a successful liveness check.
    pub process: Option<ProcessHandle>,
}

impl Service {
    /// Creates a service with all derived paths computed.
    ///
    /// State files live in `state_dir` and are named after the service with
    /// path separators flattened to `_`.
    pub fn new(
        name: impl Into<String>,
        stack: impl Into<String>,
        path: impl Into<PathBuf>,
        state_dir: &Path,
        color: Color,
    ) -> Self {
        let name = name.into();
        let stem = Self::file_stem(&name);

        Self {
            log_file_path: state_dir.join(format!("{}.log", stem)),
            pid_file_path: state_dir.join(format!("{}.pid", stem)),
            bin_path: state_dir.join("bin").join(&stem),
            name,
            stack: stack.into(),
            path: path.into(),
            color,
            env: EnvVars::new(),
            description: None,
            process: None,
        }
    }

    /// Flattens a service name into a file name.
    pub fn file_stem(name: &str) -> String {
        name.replace('/', "_")
    }

    /// Returns the current state.
    pub fn state(&self) -> ServiceState {
        if self.process.is_some() {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        }
    }

    /// Returns true if a live process is attached.
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Returns the process id of the attached process.
    pub fn pid(&self) -> Option<u32> {
        self.process.map(|p| p.pid())
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            name: self.name.clone(),
            stack: self.stack.clone(),
            state: self.state(),
            pid: self.pid(),
        }
    }

    /// Returns the name padded to `width` and rendered in the service color.
    pub fn label(&self, width: usize) -> String {
        let padding = " ".repeat(width.saturating_sub(self.name.len()));
        format!("{}{}", self.color.paint(&self.name), padding)
    }
}
