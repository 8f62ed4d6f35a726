//! orchestra - Local multi-service supervisor
//!
//! This crate discovers the services of a monorepo, tracks whether they are
//! running through PID files, and runs per-service operations with bounded
//! concurrency, all wrapped in configurable before/after hooks.
//!
//! # Overview
//!
//! A project is a directory holding an `orchestra.yml` file. Each configured
//! stack is a subdirectory whose children are services when they carry a
//! `service.yml` manifest. Commands act on a selection of services picked by
//! name, by stack, or by exclusion (`~name`).
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Project configuration parsing and validation
//! - [`error`] - Error types, exit codes and the error collector
//! - [`executor`] - Bounded-concurrency worker pool
//! - [`hooks`] - Hook and environment pipeline
//! - [`logs`] - Log tailing and aggregation
//! - [`registry`] - Service discovery, registry and selection
//! - [`service`] - Service model, manifest and liveness tracking
//! - [`supervisor`] - Per-invocation context tying everything together

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod logs;
pub mod registry;
pub mod service;
pub mod supervisor;

// Re-exports for convenience
pub use cli::Cli;
pub use config::ProjectConfig;
pub use error::{ErrorCollector, OrchestraError, Result};
pub use executor::WorkerPool;
pub use hooks::HookPipeline;
pub use logs::LogAggregator;
pub use registry::Registry;
pub use supervisor::Supervisor;
