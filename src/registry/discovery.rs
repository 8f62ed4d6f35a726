//! Service discovery.
//!
//! Every configured stack directory is listed one level deep. A child
//! directory is a service when its name does not start with `.` and it
//! contains a `service.yml` manifest. Broken stacks and services are logged
//! and skipped; discovery itself never fails.

use std::collections::HashSet;
use std::path::{Component, Path};
use tracing::{debug, error, warn};

use super::Registry;
use crate::service::{Color, LivenessTracker, Service, ServiceManifest, MANIFEST_FILE};

/// Discovers the services of every stack under `project_root`.
///
/// `""` and `"."` name the top-level stack. Each registered service has its
/// liveness checked right away.
pub fn discover(
    project_root: &Path,
    state_dir: &Path,
    stacks: &[String],
    tracker: &LivenessTracker,
) -> Registry {
    let mut registry = Registry::new();
    let mut seen = HashSet::new();

    for stack in stacks {
        let raw = stack.trim_end_matches('/');
        if !raw.is_empty() && !is_local(raw) {
            error!(stack = %raw, "Can't register stack, path is not local");
            continue;
        }
        let stack = normalize_stack(raw);
        if !seen.insert(stack.clone()) {
            debug!(stack = %stack, "Stack listed twice, skipping");
            continue;
        }
        discover_stack(&mut registry, project_root, state_dir, &stack, tracker);
    }

    debug!(
        services = registry.len(),
        stacks = registry.stack_names().len(),
        "Discovery complete"
    );
    registry
}

/// Lexically cleans a stack path: `.` components are dropped and `..` pops
/// the previous component, so `./payments` and `a/../payments` both become
/// `payments`. `.` alone is the top-level stack. Only meaningful for paths
/// that passed [`is_local`].
fn normalize_stack(stack: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(stack).components() {
        match component {
            Component::Normal(part) => parts.extend(part.to_str()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

fn discover_stack(
    registry: &mut Registry,
    project_root: &Path,
    state_dir: &Path,
    stack: &str,
    tracker: &LivenessTracker,
) {
    let stack_dir = project_root.join(stack);
    let entries = match std::fs::read_dir(&stack_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(stack = %stack, error = %e, "Error registering stack");
            return;
        }
    };

    if !stack.is_empty() {
        if let Err(e) = registry.add_stack(stack) {
            error!(stack = %stack, error = %e, "Error registering stack");
            return;
        }
    }

    let mut dirs: Vec<_> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(stack = %stack, error = %e, "Unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    // read_dir order is platform dependent; colors follow discovery order.
    dirs.sort_by_key(|entry| entry.file_name());

    for entry in dirs {
        let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(stack = %stack, path = %entry.path().display(), "Skipping non UTF-8 directory");
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }

        let service_dir = entry.path();
        if !service_dir.join(MANIFEST_FILE).is_file() {
            continue;
        }

        let name = if stack.is_empty() {
            dir_name
        } else {
            format!("{}/{}", stack, dir_name)
        };
        register_service(registry, state_dir, stack, name, &service_dir, tracker);
    }
}

fn register_service(
    registry: &mut Registry,
    state_dir: &Path,
    stack: &str,
    name: String,
    service_dir: &Path,
    tracker: &LivenessTracker,
) {
    let path = match service_dir.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            error!(service = %name, error = %e, "Error registering service");
            return;
        }
    };

    let manifest = match ServiceManifest::load(service_dir) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(service = %name, error = %e, "Error registering service");
            return;
        }
    };

    let mut service = Service::new(
        name.clone(),
        stack,
        path,
        state_dir,
        Color::for_index(registry.len()),
    );
    service.env = manifest.env;
    service.description = manifest.description;

    if let Err(e) = registry.insert(service) {
        error!(service = %name, error = %e, "Error registering service");
        return;
    }

    if let Some(service) = registry.get_mut(&name) {
        let state = tracker.check(service);
        debug!(service = %name, state = %state, "Registered service");
    }
}

/// Returns true if `path` is relative and stays inside its base directory.
///
/// `a/../b` is local, `../a`, `a/../../b` and `/a` are not.
pub fn is_local(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }

    let mut depth: usize = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}
