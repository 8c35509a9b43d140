//! Governance configuration for Warden
//!
//! Two layers combine into the effective [`GovernanceConfig`] every
//! governance decision reads:
//!
//! 1. **Deployment defaults** ([`DeploymentDefaults`]) — hierarchical,
//!    read-only at runtime: built-in defaults, then an optional
//!    `warden.toml` in the project directory, then `WARDEN__*` environment
//!    variables (highest).
//! 2. **Stored overrides** ([`GovernanceOverrides`]) — a single mutable
//!    record on the document store at `config/governance`, written only by
//!    admins through the facade. Stored values win over deployment defaults.
//!
//! One documented precedence exception: `enable_permissions` and
//! `enable_groups` only follow the deployment default when the profile is
//! not [`Profile::Production`]. In production an unset stored flag pins to
//! the built-in default (`true`), so an environment variable alone cannot
//! switch off permission enforcement or group governance.
//!
//! Resolution never fails fatally: an unreachable store logs a warning and
//! yields the deployment defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod resolver;

pub use error::ConfigError;
pub use loader::{DeploymentDefaults, DeploymentLoader};
pub use resolver::{CONFIG_DOC_PATH, ConfigResolver};

/// Deployment profile, set by `WARDEN__PROFILE` or `profile` in `warden.toml`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    Development,
    Staging,
    #[default]
    Production,
}

impl Profile {
    pub fn is_production(self) -> bool {
        self == Profile::Production
    }
}

/// Effective governance configuration.
///
/// Read by every governance decision; mutated only through
/// [`ConfigResolver::update`] (admin-gated at the facade).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub features: FeatureConfig,
    pub quotas: QuotaConfig,
    /// Global allow-list of file extensions (lowercase, no dot).
    pub allowed_file_types: Vec<String>,
    /// Per-module enablement map, keyed by module name.
    pub modules: BTreeMap<String, bool>,
}

/// Feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub enable_registration: bool,
    pub require_email_verification: bool,
    pub enable_file_management: bool,
    pub enable_permissions: bool,
    pub enable_groups: bool,
    pub maintenance_mode: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_registration: true,
            require_email_verification: false,
            enable_file_management: true,
            enable_permissions: true,
            enable_groups: true,
            maintenance_mode: false,
        }
    }
}

/// Global quota ceilings. Group-level overrides take precedence for uploads
/// targeted at a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Max file size in bytes.
    pub max_file_size: u64,
    /// Max personal file count for an ungrouped principal.
    pub max_file_count: u32,
    /// Max personal file count for a principal with any group membership.
    pub max_file_count_with_group: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MB
            max_file_count: 10,
            max_file_count_with_group: 50,
        }
    }
}

impl GovernanceConfig {
    /// Returns whether `extension` (lowercase, no dot) is globally allowed.
    ///
    /// An empty allow-list means every type is allowed.
    pub fn allows_file_type(&self, extension: &str) -> bool {
        self.allowed_file_types.is_empty()
            || self.allowed_file_types.iter().any(|t| t == extension)
    }

    /// Returns whether the named module is enabled. Unknown modules are
    /// enabled by default.
    pub fn module_enabled(&self, name: &str) -> bool {
        self.modules.get(name).copied().unwrap_or(true)
    }
}

/// Partial override record stored at `config/governance`.
///
/// Every field is optional; only explicitly set fields override the
/// deployment defaults. `updated_by` / `updated_at` are stamped on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_registration: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_email_verification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_file_management: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_permissions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_groups: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count_with_group: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_file_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<BTreeMap<String, bool>>,
}

impl GovernanceOverrides {
    /// Applies every set field onto `config`.
    pub fn apply(&self, config: &mut GovernanceConfig) {
        let f = &mut config.features;
        if let Some(v) = self.enable_registration {
            f.enable_registration = v;
        }
        if let Some(v) = self.require_email_verification {
            f.require_email_verification = v;
        }
        if let Some(v) = self.enable_file_management {
            f.enable_file_management = v;
        }
        if let Some(v) = self.enable_permissions {
            f.enable_permissions = v;
        }
        if let Some(v) = self.enable_groups {
            f.enable_groups = v;
        }
        if let Some(v) = self.maintenance_mode {
            f.maintenance_mode = v;
        }
        let q = &mut config.quotas;
        if let Some(v) = self.max_file_size {
            q.max_file_size = v;
        }
        if let Some(v) = self.max_file_count {
            q.max_file_count = v;
        }
        if let Some(v) = self.max_file_count_with_group {
            q.max_file_count_with_group = v;
        }
        if let Some(v) = &self.allowed_file_types {
            config.allowed_file_types.clone_from(v);
        }
        if let Some(v) = &self.modules {
            config.modules.clone_from(v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
