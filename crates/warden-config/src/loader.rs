//! Deployment-defaults loader with multi-source merging.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{GovernanceConfig, Profile};

/// Deployment-sourced defaults: the read-only base layer underneath the
/// stored override record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentDefaults {
    pub profile: Profile,
    #[serde(flatten)]
    pub config: GovernanceConfig,
}

impl DeploymentDefaults {
    /// Loads from default locations (current directory).
    pub fn load() -> Result<Self> {
        DeploymentLoader::new().load()
    }

    /// Loads, falling back to built-in defaults on any failure.
    pub fn load_or_default() -> Self {
        DeploymentLoader::new().load_or_default()
    }
}

/// Deployment-defaults loader with builder pattern.
///
/// Precedence, lowest first:
/// 1. Built-in defaults
/// 2. `warden.toml` in the project directory
/// 3. `WARDEN__*` environment variables
pub struct DeploymentLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl DeploymentLoader {
    /// Create a loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "WARDEN".to_string(),
        }
    }

    /// Set the project directory searched for `warden.toml`.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "WARDEN").
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load deployment defaults from all sources with proper precedence.
    pub fn load(self) -> Result<DeploymentDefaults> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = DeploymentDefaults::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. Project config (warden.toml)
        let project_file = self.project_dir.join("warden.toml");
        if project_file.exists() {
            builder = builder.add_source(
                config::File::from(project_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Environment variables (WARDEN__*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder
            .build()
            .context("Failed to build deployment configuration")?;

        merged
            .try_deserialize()
            .context("Failed to deserialize deployment configuration")
    }

    /// Load deployment defaults or return built-ins if loading fails.
    pub fn load_or_default(self) -> DeploymentDefaults {
        self.load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to built-in deployment defaults");
            DeploymentDefaults::default()
        })
    }
}

impl Default for DeploymentLoader {
    fn default() -> Self {
        Self::new()
    }
}
