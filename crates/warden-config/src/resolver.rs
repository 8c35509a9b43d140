//! Effective-config resolution against the stored override record.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use warden_store::{DocPath, Document, DocumentStore, StoreError, from_document, to_document};
use warden_types::PrincipalId;

use crate::error::ConfigError;
use crate::loader::DeploymentDefaults;
use crate::{GovernanceConfig, GovernanceOverrides};

/// Path of the singleton stored override record.
pub const CONFIG_DOC_PATH: &str = "config/governance";

/// Resolves the effective [`GovernanceConfig`] from deployment defaults and
/// the stored override record, and persists admin updates.
///
/// `resolve` never fails: if the store is unreachable or the stored record
/// is malformed, it logs and falls back to the deployment defaults.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn DocumentStore>,
    defaults: DeploymentDefaults,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn DocumentStore>, defaults: DeploymentDefaults) -> Self {
        Self { store, defaults }
    }

    /// The deployment defaults underneath the stored overrides.
    pub fn defaults(&self) -> &DeploymentDefaults {
        &self.defaults
    }

    fn doc_path() -> DocPath {
        DocPath::parse(CONFIG_DOC_PATH).expect("constant path is valid")
    }

    /// Computes the effective configuration.
    ///
    /// Stored values win over deployment defaults, except that in the
    /// `Production` profile an unset `enable_permissions` / `enable_groups`
    /// pins to the built-in default instead of following the deployment
    /// default. Environment variables alone cannot switch those two flags
    /// off in production; the stored record (admin-written) still can.
    pub async fn resolve(&self) -> GovernanceConfig {
        let overrides = match self.store.get(&Self::doc_path()).await {
            Ok(Some(doc)) => match from_document::<GovernanceOverrides>(&doc) {
                Ok(overrides) => Some(overrides),
                Err(err) => {
                    warn!(error = %err, "stored governance config is malformed; using deployment defaults");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "governance config unreachable; using deployment defaults");
                None
            }
        };

        let mut config = self.defaults.config.clone();
        let overrides = overrides.unwrap_or_default();
        overrides.apply(&mut config);

        if self.defaults.profile.is_production() {
            let builtin = crate::FeatureConfig::default();
            if overrides.enable_permissions.is_none() {
                config.features.enable_permissions = builtin.enable_permissions;
            }
            if overrides.enable_groups.is_none() {
                config.features.enable_groups = builtin.enable_groups;
            }
        }

        debug!(profile = ?self.defaults.profile, "governance config resolved");
        config
    }

    /// Merges `partial` into the stored override record, stamping
    /// `updated_by` / `updated_at`.
    ///
    /// Authority (admin-only) is enforced by the facade, not here.
    pub async fn update(
        &self,
        partial: &GovernanceOverrides,
        actor_id: PrincipalId,
    ) -> Result<(), ConfigError> {
        let mut patch: Document = to_document(partial)?;
        patch.insert("updated_by".to_string(), json!(actor_id.to_string()));
        patch.insert("updated_at".to_string(), json!(Utc::now()));

        let path = Self::doc_path();
        match self.store.update(&path, patch.clone()).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                // First write: the singleton record does not exist yet.
                self.store.create(&path, patch).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Profile;
    use warden_store::MemoryDocumentStore;

    fn resolver_with_profile(profile: Profile) -> (ConfigResolver, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let defaults = DeploymentDefaults {
            profile,
            config: GovernanceConfig::default(),
        };
        (
            ConfigResolver::new(store.clone(), defaults),
            store,
        )
    }

    #[tokio::test]
    async fn resolve_without_stored_record_yields_defaults() {
        let (resolver, _store) = resolver_with_profile(Profile::Production);
        let config = resolver.resolve().await;
        assert_eq!(config, GovernanceConfig::default());
    }

    #[tokio::test]
    async fn stored_overrides_win() {
        let (resolver, _store) = resolver_with_profile(Profile::Production);
        let actor = PrincipalId::new();
        resolver
            .update(
                &GovernanceOverrides {
                    max_file_count: Some(99),
                    maintenance_mode: Some(true),
                    ..Default::default()
                },
                actor,
            )
            .await
            .unwrap();

        let config = resolver.resolve().await;
        assert_eq!(config.quotas.max_file_count, 99);
        assert!(config.features.maintenance_mode);
        // Unset fields still follow deployment defaults.
        assert_eq!(config.quotas.max_file_size, 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn update_stamps_actor_and_time() {
        let (resolver, store) = resolver_with_profile(Profile::Production);
        let actor = PrincipalId::new();
        resolver
            .update(
                &GovernanceOverrides {
                    max_file_size: Some(1024),
                    ..Default::default()
                },
                actor,
            )
            .await
            .unwrap();

        let doc = store
            .get(&DocPath::parse(CONFIG_DOC_PATH).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("updated_by"), Some(&json!(actor.to_string())));
        assert!(doc.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn sequential_updates_merge() {
        let (resolver, _store) = resolver_with_profile(Profile::Production);
        let actor = PrincipalId::new();
        resolver
            .update(
                &GovernanceOverrides {
                    max_file_count: Some(5),
                    ..Default::default()
                },
                actor,
            )
            .await
            .unwrap();
        resolver
            .update(
                &GovernanceOverrides {
                    maintenance_mode: Some(true),
                    ..Default::default()
                },
                actor,
            )
            .await
            .unwrap();

        let config = resolver.resolve().await;
        assert_eq!(config.quotas.max_file_count, 5);
        assert!(config.features.maintenance_mode);
    }

    #[tokio::test]
    async fn production_pins_unset_governance_flags_to_builtins() {
        // Deployment defaults try to disable the two governance flags.
        let store = Arc::new(MemoryDocumentStore::new());
        let mut config = GovernanceConfig::default();
        config.features.enable_permissions = false;
        config.features.enable_groups = false;

        let prod = ConfigResolver::new(
            store.clone(),
            DeploymentDefaults {
                profile: Profile::Production,
                config: config.clone(),
            },
        );
        let dev = ConfigResolver::new(
            store.clone(),
            DeploymentDefaults {
                profile: Profile::Development,
                config,
            },
        );

        // Production: unset stored flags pin back to built-in (enabled).
        let resolved = prod.resolve().await;
        assert!(resolved.features.enable_permissions);
        assert!(resolved.features.enable_groups);

        // Non-production: deployment defaults apply as-is.
        let resolved = dev.resolve().await;
        assert!(!resolved.features.enable_permissions);
        assert!(!resolved.features.enable_groups);

        // An explicit stored value wins everywhere.
        prod.update(
            &GovernanceOverrides {
                enable_groups: Some(false),
                ..Default::default()
            },
            PrincipalId::new(),
        )
        .await
        .unwrap();
        let resolved = prod.resolve().await;
        assert!(!resolved.features.enable_groups);
        assert!(resolved.features.enable_permissions);
    }
}
