//! # warden-access: File access evaluation and sharing
//!
//! Decides read/write eligibility for a (principal, file) pair and manages
//! the per-file grant list.
//!
//! Access is a short-circuit OR over, in order:
//!
//! 1. actor role is admin or moderator
//! 2. actor owns the file
//! 3. the file is public
//! 4. the file is an app file
//! 5. the actor is in the file's `accessible_by` grant list
//! 6. the file is a group file and the actor's **current** group matches
//!
//! Rule 6 means former members lose access the moment they leave the group.
//!
//! Sharing is gated on *ownership*, not access: having been granted access
//! to a file does not allow re-sharing it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use warden_rbac::{Role, can_manage};
use warden_store::{Document, DocumentStore, StoreError, from_document};
use warden_types::{FileId, FileKind, FileResource, Principal, PrincipalId, paths};

/// Errors from store-backed access operations.
///
/// Plain access denial is not an error — [`evaluate_access`] returns a
/// bool. These cover missing records, unauthorized share mutations, and
/// collaborator failures.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("file not found: {0}")]
    FileNotFound(FileId),

    #[error("principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    #[error("only the file owner may share or unshare it")]
    NotOwner,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Pure access decision for an already-loaded (principal, file) pair.
pub fn evaluate_access(principal: &Principal, file: &FileResource) -> bool {
    if can_manage(principal.role) {
        return true;
    }
    if file.owner_id == principal.id {
        return true;
    }
    if file.is_public {
        return true;
    }
    if file.is_app_file {
        return true;
    }
    if file.accessible_by.contains(&principal.id) {
        return true;
    }
    if file.kind == FileKind::Group
        && file.group_id.is_some()
        && principal.group_id == file.group_id
    {
        return true;
    }
    false
}

/// Store-backed access evaluation and share management.
#[derive(Clone)]
pub struct AccessEvaluator {
    store: Arc<dyn DocumentStore>,
}

impl AccessEvaluator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn load_principal(&self, id: PrincipalId) -> Result<Principal> {
        let doc = self
            .store
            .get(&paths::user(id))
            .await?
            .ok_or(AccessError::PrincipalNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    async fn load_file(&self, id: FileId) -> Result<FileResource> {
        let doc = self
            .store
            .get(&paths::file(id))
            .await?
            .ok_or(AccessError::FileNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    /// May `user_id` access `file_id`?
    ///
    /// Missing principal or file evaluates to `false` rather than an error:
    /// a dangling reference is a denial, not a fault.
    pub async fn can_access(&self, user_id: PrincipalId, file_id: FileId) -> Result<bool> {
        let principal = match self.load_principal(user_id).await {
            Ok(p) => p,
            Err(AccessError::PrincipalNotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        let file = match self.load_file(file_id).await {
            Ok(f) => f,
            Err(AccessError::FileNotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        };

        let allowed = evaluate_access(&principal, &file);
        if allowed {
            debug!(user = %user_id, file = %file_id, "file access granted");
        } else {
            info!(user = %user_id, file = %file_id, "file access denied");
        }
        Ok(allowed)
    }

    /// Grants `target_id` access to `file_id`.
    ///
    /// Only the file's owner may share it; being in the grant list is not
    /// enough. Granting to an already-granted target is a no-op.
    pub async fn share(
        &self,
        file_id: FileId,
        actor_id: PrincipalId,
        target_id: PrincipalId,
    ) -> Result<()> {
        let file = self.load_file(file_id).await?;
        if file.owner_id != actor_id {
            warn!(file = %file_id, actor = %actor_id, "share refused: not the owner");
            return Err(AccessError::NotOwner);
        }
        // Target must exist; sharing with a dangling id would grant nothing.
        self.load_principal(target_id).await?;

        let mut accessible_by = file.accessible_by;
        if !accessible_by.insert(target_id) {
            return Ok(());
        }

        let mut patch = Document::new();
        patch.insert("accessible_by".to_string(), json!(accessible_by));
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        self.store.update(&paths::file(file_id), patch).await?;
        info!(file = %file_id, target = %target_id, "file shared");
        Ok(())
    }

    /// Revokes `target_id`'s grant on `file_id`. Owner-only, like
    /// [`share`](Self::share). Revoking an absent grant is a no-op.
    pub async fn unshare(
        &self,
        file_id: FileId,
        actor_id: PrincipalId,
        target_id: PrincipalId,
    ) -> Result<()> {
        let file = self.load_file(file_id).await?;
        if file.owner_id != actor_id {
            warn!(file = %file_id, actor = %actor_id, "unshare refused: not the owner");
            return Err(AccessError::NotOwner);
        }

        let mut accessible_by = file.accessible_by;
        if !accessible_by.remove(&target_id) {
            return Ok(());
        }

        let mut patch = Document::new();
        patch.insert("accessible_by".to_string(), json!(accessible_by));
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        self.store.update(&paths::file(file_id), patch).await?;
        info!(file = %file_id, target = %target_id, "file share revoked");
        Ok(())
    }
}
