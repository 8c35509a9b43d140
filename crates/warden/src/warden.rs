//! The governance facade: the single trust boundary exposed to callers.
//!
//! Every mutating operation re-validates authority here, even when the
//! caller (a UI pre-flight, say) already checked — the facade trusts
//! nothing upstream of it. Reads that merely render state degrade
//! gracefully when the store is unreachable; mutations never do.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use warden_access::AccessEvaluator;
use warden_config::{ConfigResolver, DeploymentDefaults, GovernanceConfig, GovernanceOverrides};
use warden_groups::{AssignmentValidation, MembershipManager, can_manage_group};
use warden_quota::{QuotaEnforcer, UploadDecision, UploadRequest};
use warden_rbac::{Role, can_assign_role, can_manage};
use warden_store::{
    BlobStore, Document, DocumentStore, MemoryBlobStore, MemoryDocumentStore, from_document,
    to_document,
};
use warden_types::{
    FileId, FileKind, FileResource, Group, GroupId, GroupPermissions, Principal, PrincipalId,
    paths,
};

use crate::error::{GovernanceError, Result};

/// A file upload request handed to [`Warden::upload_file`].
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub bytes: Bytes,
    pub mime_type: String,
    /// Target group for a group upload; `None` for a personal upload.
    pub group_id: Option<GroupId>,
    pub is_public: bool,
}

impl FileUpload {
    pub fn personal(name: impl Into<String>, bytes: Bytes, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime_type: mime_type.into(),
            group_id: None,
            is_public: false,
        }
    }

    pub fn group(
        name: impl Into<String>,
        bytes: Bytes,
        mime_type: impl Into<String>,
        group_id: GroupId,
    ) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::personal(name, bytes, mime_type)
        }
    }
}

/// Partial update for [`Warden::update_group`].
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<GroupPermissions>,
}

/// The governance engine's orchestration boundary.
///
/// Construct with injected store and blob collaborators; the facade wires
/// the config resolver, membership manager, quota enforcer, and access
/// evaluator on top of them.
#[derive(Clone)]
pub struct Warden {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    resolver: ConfigResolver,
    membership: MembershipManager,
    quota: QuotaEnforcer,
    access: AccessEvaluator,
}

impl Warden {
    /// Builds a facade over the given collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        defaults: DeploymentDefaults,
    ) -> Self {
        let resolver = ConfigResolver::new(store.clone(), defaults);
        Self {
            membership: MembershipManager::new(store.clone(), resolver.clone()),
            quota: QuotaEnforcer::new(store.clone(), resolver.clone()),
            access: AccessEvaluator::new(store.clone()),
            resolver,
            blobs,
            store,
        }
    }

    /// Builds a facade over fresh in-memory stores. Intended for tests and
    /// local runs without a configured backend.
    pub fn in_memory(defaults: DeploymentDefaults) -> Self {
        Self::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
            defaults,
        )
    }

    /// The config resolver (also reachable through
    /// [`get_config`](Self::get_config) / [`update_config`](Self::update_config)).
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    // ------------------------------------------------------------------
    // record loading
    // ------------------------------------------------------------------

    async fn load_principal(&self, id: PrincipalId) -> Result<Principal> {
        let doc =
            self.store
                .get(&paths::user(id))
                .await?
                .ok_or_else(|| GovernanceError::NotFound {
                    entity: "user",
                    id: id.to_string(),
                })?;
        Ok(from_document(&doc)?)
    }

    async fn load_group(&self, id: GroupId) -> Result<Group> {
        let doc =
            self.store
                .get(&paths::group(id))
                .await?
                .ok_or_else(|| GovernanceError::NotFound {
                    entity: "group",
                    id: id.to_string(),
                })?;
        Ok(from_document(&doc)?)
    }

    async fn load_file(&self, id: FileId) -> Result<FileResource> {
        let doc =
            self.store
                .get(&paths::file(id))
                .await?
                .ok_or_else(|| GovernanceError::NotFound {
                    entity: "file",
                    id: id.to_string(),
                })?;
        Ok(from_document(&doc)?)
    }

    // ------------------------------------------------------------------
    // gates
    // ------------------------------------------------------------------

    /// Rejects non-admin mutations while maintenance mode is active.
    fn ensure_operational(config: &GovernanceConfig, actor_role: Option<Role>) -> Result<()> {
        if config.features.maintenance_mode && actor_role != Some(Role::Admin) {
            return Err(GovernanceError::invalid("maintenance mode is active"));
        }
        Ok(())
    }

    fn ensure_groups_enabled(config: &GovernanceConfig) -> Result<()> {
        if !config.features.enable_groups {
            return Err(GovernanceError::invalid("group management is disabled"));
        }
        Ok(())
    }

    fn ensure_files_enabled(config: &GovernanceConfig) -> Result<()> {
        if !config.features.enable_file_management {
            return Err(GovernanceError::invalid("file management is disabled"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // users
    // ------------------------------------------------------------------

    /// Registers a principal for an external identity event.
    ///
    /// New principals start with the `user` role, no group, and a zero
    /// upload counter.
    pub async fn create_user(
        &self,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Principal> {
        let config = self.resolver.resolve().await;
        if !config.features.enable_registration {
            return Err(GovernanceError::denied("registration is disabled"));
        }
        Self::ensure_operational(&config, None)?;

        let principal = Principal::new(email, display_name);
        self.store
            .create(&paths::user(principal.id), to_document(&principal)?)
            .await?;
        info!(user = %principal.id, "user created");
        Ok(principal)
    }

    /// Changes `user_id`'s role, subject to the assignment matrix.
    pub async fn update_user_role(
        &self,
        user_id: PrincipalId,
        new_role: Role,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        if !config.features.enable_permissions {
            return Err(GovernanceError::invalid("permission management is disabled"));
        }
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.load_principal(user_id).await?;

        if !can_assign_role(actor.role, new_role) {
            warn!(actor = %actor_id, target_role = %new_role, "role assignment refused");
            return Err(GovernanceError::denied(format!(
                "{} may not grant the {new_role} role",
                actor.role
            )));
        }

        let mut patch = Document::new();
        patch.insert("role".to_string(), json!(new_role));
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        self.store.update(&paths::user(user_id), patch).await?;
        info!(user = %user_id, role = %new_role, actor = %actor_id, "role updated");
        Ok(())
    }

    /// Lists every principal. Management-only.
    ///
    /// Degrades to an empty list when the store is unreachable.
    pub async fn list_users(&self, actor_id: PrincipalId) -> Result<Vec<Principal>> {
        let actor = self.load_principal(actor_id).await?;
        if !can_manage(actor.role) {
            return Err(GovernanceError::denied("only admins and moderators may list users"));
        }
        match self.store.list(&paths::users()).await {
            Ok(docs) => Ok(docs
                .iter()
                .filter_map(|(_, doc)| from_document(doc).ok())
                .collect()),
            Err(err) if err.is_unavailable() => {
                warn!(error = %err, "user listing degraded to empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    // ------------------------------------------------------------------
    // groups
    // ------------------------------------------------------------------

    /// Creates a group owned by `owner_id`. Management-only.
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        owner_id: PrincipalId,
        actor_id: PrincipalId,
    ) -> Result<Group> {
        let config = self.resolver.resolve().await;
        Self::ensure_groups_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        if !can_manage(actor.role) {
            return Err(GovernanceError::denied(
                "only admins and moderators may create groups",
            ));
        }
        self.load_principal(owner_id).await?;

        let group = Group::new(name, description, owner_id);
        self.store
            .create(&paths::group(group.id), to_document(&group)?)
            .await?;
        info!(group = %group.id, owner = %owner_id, actor = %actor_id, "group created");
        Ok(group)
    }

    /// Applies a partial update to a group's name, description, or
    /// permission overrides. Requires management rights or ownership.
    pub async fn update_group(
        &self,
        group_id: GroupId,
        update: GroupUpdate,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_groups_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        let group = self.load_group(group_id).await?;
        if !can_manage_group(&actor, &group) {
            return Err(GovernanceError::denied(format!(
                "{actor_id} is not authorized to edit group {group_id}"
            )));
        }

        let mut patch = Document::new();
        if let Some(name) = update.name {
            patch.insert("name".to_string(), json!(name));
        }
        if let Some(description) = update.description {
            patch.insert("description".to_string(), json!(description));
        }
        if let Some(permissions) = update.permissions {
            patch.insert("permissions".to_string(), json!(permissions));
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        self.store.update(&paths::group(group_id), patch).await?;
        info!(group = %group_id, actor = %actor_id, "group updated");
        Ok(())
    }

    /// Deletes a group after cascading all members out. Admin-or-owner.
    pub async fn delete_group(&self, group_id: GroupId, actor_id: PrincipalId) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_groups_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.membership.delete_group(group_id, actor_id).await?;
        Ok(())
    }

    /// Assigns `user_id` to a group, transferring from any current one.
    pub async fn assign_user_to_group(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_groups_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.membership.assign(user_id, group_id, actor_id).await?;
        Ok(())
    }

    /// Removes `user_id` from a group.
    pub async fn remove_user_from_group(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_groups_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.membership.remove(user_id, group_id, actor_id).await?;
        Ok(())
    }

    /// Alias for [`assign_user_to_group`](Self::assign_user_to_group),
    /// matching the group-centric side of the API.
    pub async fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: PrincipalId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        self.assign_user_to_group(user_id, group_id, actor_id).await
    }

    /// Alias for [`remove_user_from_group`](Self::remove_user_from_group).
    pub async fn remove_group_member(
        &self,
        group_id: GroupId,
        user_id: PrincipalId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        self.remove_user_from_group(user_id, group_id, actor_id).await
    }

    /// UI pre-flight for a prospective assignment; performs no writes.
    pub async fn validate_assignment(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
    ) -> Result<AssignmentValidation> {
        Ok(self.membership.validate_assignment(user_id, group_id).await?)
    }

    /// Lists every group.
    ///
    /// Degrades to an empty list when the store is unreachable.
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        match self.store.list(&paths::groups()).await {
            Ok(docs) => Ok(docs
                .iter()
                .filter_map(|(_, doc)| from_document(doc).ok())
                .collect()),
            Err(err) if err.is_unavailable() => {
                warn!(error = %err, "group listing degraded to empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    // ------------------------------------------------------------------
    // files
    // ------------------------------------------------------------------

    /// Uploads a file: quota reservation → blob put → metadata create.
    ///
    /// The quota check and the personal upload counter increment commit in
    /// one transaction, so concurrent uploads cannot overshoot the ceiling.
    /// If the blob or metadata write fails after a personal reservation,
    /// the counter is released again.
    pub async fn upload_file(&self, upload: FileUpload, actor_id: PrincipalId) -> Result<FileResource> {
        let config = self.resolver.resolve().await;
        Self::ensure_files_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;

        let request = UploadRequest {
            file_name: Some(upload.name.clone()),
            size: upload.bytes.len() as u64,
            group_id: upload.group_id,
        };
        match self.quota.reserve(actor_id, &request).await? {
            UploadDecision::Allowed => {}
            UploadDecision::Denied { reason } => {
                return Err(GovernanceError::QuotaExceeded { reason });
            }
        }

        let file_id = FileId::new();
        let storage_path = format!("uploads/{actor_id}/{file_id}/{}", upload.name);
        let outcome = self
            .put_file(&upload, actor_id, file_id, &storage_path)
            .await;
        match outcome {
            Ok(file) => Ok(file),
            Err(err) => {
                // Compensate the personal reservation; group uploads took none.
                if upload.group_id.is_none() {
                    if let Err(release_err) = self.quota.release(actor_id).await {
                        warn!(error = %release_err, "failed to release upload reservation");
                    }
                }
                Err(err)
            }
        }
    }

    async fn put_file(
        &self,
        upload: &FileUpload,
        actor_id: PrincipalId,
        file_id: FileId,
        storage_path: &str,
    ) -> Result<FileResource> {
        let put = self
            .blobs
            .put(storage_path, upload.bytes.clone(), &upload.mime_type)
            .await?;

        let mut file = match upload.group_id {
            Some(group_id) => FileResource::group(
                upload.name.clone(),
                actor_id,
                group_id,
                storage_path,
                upload.mime_type.clone(),
                put.size,
            ),
            None => FileResource::personal(
                upload.name.clone(),
                actor_id,
                storage_path,
                upload.mime_type.clone(),
                put.size,
            ),
        };
        file.id = file_id;
        file.is_public = upload.is_public;

        self.store
            .create(&paths::file(file.id), to_document(&file)?)
            .await?;
        info!(file = %file.id, owner = %actor_id, size = put.size, "file uploaded");
        Ok(file)
    }

    /// Deletes a file: blob delete → metadata delete → counter decrement.
    ///
    /// Owners may delete their own files; admins and moderators may delete
    /// any file.
    pub async fn delete_file(&self, file_id: FileId, actor_id: PrincipalId) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_files_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        let file = self.load_file(file_id).await?;

        if file.owner_id != actor_id && !can_manage(actor.role) {
            warn!(file = %file_id, actor = %actor_id, "file deletion refused");
            return Err(GovernanceError::denied(
                "only the file owner or a manager may delete a file",
            ));
        }

        self.blobs.delete(&file.storage_path).await?;
        self.store.delete(&paths::file(file_id)).await?;
        if file.kind == FileKind::Personal {
            self.quota.release(file.owner_id).await?;
        }
        info!(file = %file_id, actor = %actor_id, "file deleted");
        Ok(())
    }

    /// May `user_id` read `file_id`?
    pub async fn can_access_file(&self, user_id: PrincipalId, file_id: FileId) -> Result<bool> {
        Ok(self.access.can_access(user_id, file_id).await?)
    }

    /// Grants `target_id` access to a file. Owner-only.
    pub async fn share_file(
        &self,
        file_id: FileId,
        actor_id: PrincipalId,
        target_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_files_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.access.share(file_id, actor_id, target_id).await?;
        Ok(())
    }

    /// Revokes `target_id`'s grant on a file. Owner-only.
    pub async fn unshare_file(
        &self,
        file_id: FileId,
        actor_id: PrincipalId,
        target_id: PrincipalId,
    ) -> Result<()> {
        let config = self.resolver.resolve().await;
        Self::ensure_files_enabled(&config)?;
        let actor = self.load_principal(actor_id).await?;
        Self::ensure_operational(&config, Some(actor.role))?;
        self.access.unshare(file_id, actor_id, target_id).await?;
        Ok(())
    }

    /// Returns the download URL for a file the actor may access.
    pub async fn file_url(&self, file_id: FileId, actor_id: PrincipalId) -> Result<String> {
        if !self.access.can_access(actor_id, file_id).await? {
            return Err(GovernanceError::denied("no access to this file"));
        }
        let file = self.load_file(file_id).await?;
        Ok(self.blobs.url(&file.storage_path).await?)
    }

    /// Lists the files visible to `actor_id` under the access rules.
    ///
    /// Degrades to an empty list when the store is unreachable.
    pub async fn list_files(&self, actor_id: PrincipalId) -> Result<Vec<FileResource>> {
        let actor = self.load_principal(actor_id).await?;
        match self.store.list(&paths::files()).await {
            Ok(docs) => Ok(docs
                .iter()
                .filter_map(|(_, doc)| from_document::<FileResource>(doc).ok())
                .filter(|file| warden_access::evaluate_access(&actor, file))
                .collect()),
            Err(err) if err.is_unavailable() => {
                warn!(error = %err, "file listing degraded to empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    // ------------------------------------------------------------------
    // configuration
    // ------------------------------------------------------------------

    /// The effective governance configuration.
    pub async fn get_config(&self) -> GovernanceConfig {
        self.resolver.resolve().await
    }

    /// Applies a partial configuration override. Admin-only.
    pub async fn update_config(
        &self,
        partial: GovernanceOverrides,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let actor = self.load_principal(actor_id).await?;
        if actor.role != Role::Admin {
            return Err(GovernanceError::denied(
                "only admins may change the governance configuration",
            ));
        }
        self.resolver.update(&partial, actor_id).await?;
        info!(actor = %actor_id, "governance configuration updated");
        Ok(())
    }
}
