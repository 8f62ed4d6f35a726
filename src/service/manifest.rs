//! Per-service manifest (`service.yml`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::EnvVars;
use crate::error::{OrchestraError, Result};

/// File name that marks a directory as a service.
pub const MANIFEST_FILE: &str = "service.yml";

/// Contents of a service manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceManifest {
    /// Free-form description.
    pub description: Option<String>,

    /// Environment variables for the service.
    pub env: EnvVars,
}

impl ServiceManifest {
    /// Loads the manifest from a service directory.
    pub fn load(service_dir: &Path) -> Result<Self> {
        let path = service_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            OrchestraError::config_with_source(
                format!("Failed to read manifest: {}", path.display()),
                e,
            )
        })?;

        Self::load_from_str(&content).map_err(|e| {
            OrchestraError::config_with_source(
                format!("Failed to parse manifest: {}", path.display()),
                e,
            )
        })
    }

    /// Parses a manifest. An empty document is an empty manifest.
    pub fn load_from_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_env() {
        let manifest =
            ServiceManifest::load_from_str("description: api\nenv:\n  PORT: 8080\n  MODE: dev\n")
                .unwrap();
        assert_eq!(manifest.description.as_deref(), Some("api"));
        assert_eq!(manifest.env.to_pairs(), vec!["PORT=8080", "MODE=dev"]);
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = ServiceManifest::load_from_str("").unwrap();
        assert!(manifest.env.is_empty());

        let manifest = ServiceManifest::load_from_str("  \n").unwrap();
        assert!(manifest.description.is_none());
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(ServiceManifest::load_from_str("env: [1, 2").is_err());
        assert!(ServiceManifest::load_from_str("env:\n  - A=1\n").is_err());
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServiceManifest::load(dir.path()).is_err());
    }
}
