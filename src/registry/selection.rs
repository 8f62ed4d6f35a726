//! Include/exclude selection over the registry.
//!
//! Tokens are service or stack names. A `~` prefix excludes the target, a bare
//! name includes it, and `.` stands for the service in the current directory.
//! A selection is either all inclusions or all exclusions; every token is
//! resolved and the mode checked before the registry is touched.

use std::collections::HashSet;
use std::path::{Component, Path};
use tracing::debug;

use super::Registry;
use crate::error::{OrchestraError, Result};

/// Net mode of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// No tokens: the whole registry.
    All,
    /// Only the named services and stacks.
    Include,
    /// Everything except the named services and stacks.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Service(String),
    Stack(String),
}

/// Narrows `registry` to the services selected by `tokens`.
///
/// `project_root` and `cwd` resolve the `.` alias. Unknown names fail with
/// [`OrchestraError::UnknownTarget`]; mixing `~name` and `name` fails with
/// [`OrchestraError::MixedSelection`]. In both cases the registry is left
/// untouched.
pub fn select<S: AsRef<str>>(
    registry: &mut Registry,
    tokens: &[S],
    project_root: &Path,
    cwd: &Path,
) -> Result<SelectionMode> {
    if tokens.is_empty() {
        return Ok(SelectionMode::All);
    }

    let mut balance: i64 = 0;
    let mut targets = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = token.as_ref();
        let (exclude, name) = match token.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let name = resolve_alias(name.trim_end_matches('/'), project_root, cwd)?;
        let target = resolve_target(registry, name)?;

        balance += if exclude { 1 } else { -1 };
        targets.push(target);
    }

    if balance.unsigned_abs() as usize != tokens.len() {
        return Err(OrchestraError::MixedSelection);
    }

    if balance > 0 {
        for target in &targets {
            match target {
                Target::Service(name) => {
                    registry.remove_service(name);
                }
                Target::Stack(name) => {
                    registry.remove_stack(name);
                }
            }
        }
        debug!(remaining = registry.len(), "Applied exclusions");
        Ok(SelectionMode::Exclude)
    } else {
        let mut included = HashSet::new();
        for target in &targets {
            match target {
                Target::Service(name) => {
                    included.insert(name.clone());
                }
                Target::Stack(name) => {
                    included.extend(registry.stack(name).unwrap_or_default().iter().cloned());
                }
            }
        }
        registry.retain(|name| included.contains(name));
        debug!(remaining = registry.len(), "Applied inclusions");
        Ok(SelectionMode::Include)
    }
}

fn resolve_alias(name: &str, project_root: &Path, cwd: &Path) -> Result<String> {
    if name != "." {
        return Ok(name.to_string());
    }

    let relative = cwd
        .strip_prefix(project_root)
        .map_err(|_| OrchestraError::unknown_target(name))?;

    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    match parts {
        Some(parts) if !parts.is_empty() => Ok(parts.join("/")),
        _ => Err(OrchestraError::unknown_target(name)),
    }
}

fn resolve_target(registry: &Registry, name: String) -> Result<Target> {
    if registry.contains_service(&name) {
        Ok(Target::Service(name))
    } else if registry.contains_stack(&name) {
        Ok(Target::Stack(name))
    } else {
        Err(OrchestraError::unknown_target(name))
    }
}
