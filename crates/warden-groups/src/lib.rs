//! # warden-groups: Group membership management
//!
//! Enforces the "at most one group per user" invariant: a principal's
//! `group_id` and the group's `member_ids` must agree at every observation
//! point. Every membership mutation therefore writes both records inside a
//! single store transaction — a crash or a conflicting concurrent write can
//! never leave a principal pointing at no group, or at two.
//!
//! Assigning a user who already belongs to a *different* group silently
//! transfers them (leave old, join new, one commit).
//! [`MembershipManager::validate_assignment`] surfaces that case as a
//! warning so UIs can ask for confirmation first, but the engine itself does
//! not require it.
//!
//! Group deletion cascades: members are removed one by one (each its own
//! commit, so partial completion is observable on failure) and the group
//! record is deleted only once no member remains.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use warden_config::ConfigResolver;
use warden_rbac::{Role, can_manage};
use warden_store::{DocPath, Document, DocumentStore, StoreError, Transaction, from_document};
use warden_types::{Group, GroupId, Principal, PrincipalId, paths};

/// Errors from membership operations.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    #[error("{actor} is not authorized to manage group {group}")]
    NotAuthorized { actor: PrincipalId, group: GroupId },

    #[error("only an admin or the group owner may delete group {0}")]
    DeleteNotAuthorized(GroupId),

    #[error("user {user} is already a member of group {group}")]
    AlreadyMember { user: PrincipalId, group: GroupId },

    #[error("user {user} is not a member of group {group}")]
    NotMember { user: PrincipalId, group: GroupId },

    #[error("group {group} still has {members} member(s)")]
    GroupNotEmpty { group: GroupId, members: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for membership operations.
pub type Result<T> = std::result::Result<T, GroupError>;

/// Pre-flight verdict for a prospective assignment.
///
/// `valid` with a `warning` means the assignment will succeed but silently
/// transfer the user out of their current group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub warning: Option<String>,
}

impl AssignmentValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
            warning: None,
        }
    }

    fn ok_with_warning(warning: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: None,
            warning: Some(warning.into()),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            warning: None,
        }
    }
}

/// May `actor` manage `group`? Admins and moderators may manage any group;
/// otherwise only the group's owner.
pub fn can_manage_group(actor: &Principal, group: &Group) -> bool {
    can_manage(actor.role) || group.owner_id == actor.id
}

/// May `actor` delete `group`? Stricter than management: admin or owner
/// only — a moderator cannot delete someone else's group.
pub fn can_delete_group(actor: &Principal, group: &Group) -> bool {
    actor.role == Role::Admin || group.owner_id == actor.id
}

/// Store-backed membership manager.
#[derive(Clone)]
pub struct MembershipManager {
    store: Arc<dyn DocumentStore>,
    resolver: ConfigResolver,
}

impl MembershipManager {
    pub fn new(store: Arc<dyn DocumentStore>, resolver: ConfigResolver) -> Self {
        Self { store, resolver }
    }

    async fn load_principal(&self, id: PrincipalId) -> Result<Principal> {
        let doc = self
            .store
            .get(&paths::user(id))
            .await?
            .ok_or(GroupError::PrincipalNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    async fn load_group(&self, id: GroupId) -> Result<Group> {
        let doc = self
            .store
            .get(&paths::group(id))
            .await?
            .ok_or(GroupError::GroupNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    async fn tx_group(tx: &mut Box<dyn Transaction>, id: GroupId) -> Result<Group> {
        let doc = tx
            .get(&paths::group(id))
            .await?
            .ok_or(GroupError::GroupNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    async fn tx_principal(tx: &mut Box<dyn Transaction>, id: PrincipalId) -> Result<Principal> {
        let doc = tx
            .get(&paths::user(id))
            .await?
            .ok_or(GroupError::PrincipalNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    fn stage_member_ids(tx: &mut Box<dyn Transaction>, path: &DocPath, group: &Group) {
        let mut patch = Document::new();
        patch.insert("member_ids".to_string(), json!(group.member_ids));
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        tx.update(path, patch);
    }

    fn stage_principal_group(
        tx: &mut Box<dyn Transaction>,
        path: &DocPath,
        group_id: Option<GroupId>,
    ) {
        let mut patch = Document::new();
        patch.insert("group_id".to_string(), json!(group_id));
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        tx.update(path, patch);
    }

    /// Assigns `user_id` to `group_id`, transferring from any current group.
    ///
    /// Requires the actor be an admin, a moderator, or the target group's
    /// owner. The old-group removal, new-group join, and principal write
    /// commit together.
    pub async fn assign(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let actor = self.load_principal(actor_id).await?;
        let target = self.load_group(group_id).await?;
        if !can_manage_group(&actor, &target) {
            warn!(actor = %actor_id, group = %group_id, "group assignment refused");
            return Err(GroupError::NotAuthorized {
                actor: actor_id,
                group: group_id,
            });
        }

        let mut tx = self.store.begin().await?;
        let mut group = Self::tx_group(&mut tx, group_id).await?;
        let principal = Self::tx_principal(&mut tx, user_id).await?;

        if principal.group_id == Some(group_id) {
            return Err(GroupError::AlreadyMember {
                user: user_id,
                group: group_id,
            });
        }

        // Transfer: leave the old group in the same commit.
        if let Some(old_id) = principal.group_id {
            if let Some(doc) = tx.get(&paths::group(old_id)).await? {
                let mut old_group: Group = from_document(&doc)?;
                old_group.member_ids.remove(&user_id);
                Self::stage_member_ids(&mut tx, &paths::group(old_id), &old_group);
            }
        }

        group.member_ids.insert(user_id);
        Self::stage_member_ids(&mut tx, &paths::group(group_id), &group);
        Self::stage_principal_group(&mut tx, &paths::user(user_id), Some(group_id));
        tx.commit().await?;

        info!(user = %user_id, group = %group_id, actor = %actor_id, "user assigned to group");
        Ok(())
    }

    /// Removes `user_id` from `group_id`, clearing both sides together.
    pub async fn remove(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
        actor_id: PrincipalId,
    ) -> Result<()> {
        let actor = self.load_principal(actor_id).await?;
        let target = self.load_group(group_id).await?;
        if !can_manage_group(&actor, &target) {
            warn!(actor = %actor_id, group = %group_id, "group removal refused");
            return Err(GroupError::NotAuthorized {
                actor: actor_id,
                group: group_id,
            });
        }

        let mut tx = self.store.begin().await?;
        let mut group = Self::tx_group(&mut tx, group_id).await?;
        let principal = Self::tx_principal(&mut tx, user_id).await?;

        if principal.group_id != Some(group_id) && !group.has_member(user_id) {
            return Err(GroupError::NotMember {
                user: user_id,
                group: group_id,
            });
        }

        group.member_ids.remove(&user_id);
        Self::stage_member_ids(&mut tx, &paths::group(group_id), &group);
        Self::stage_principal_group(&mut tx, &paths::user(user_id), None);
        tx.commit().await?;

        info!(user = %user_id, group = %group_id, actor = %actor_id, "user removed from group");
        Ok(())
    }

    /// Deletes `group_id` after cascading every member out.
    ///
    /// Removals run sequentially, one commit each — a failure partway
    /// leaves the group smaller but intact, never half-deleted. The group
    /// record itself is deleted only once no member remains.
    pub async fn delete_group(&self, group_id: GroupId, actor_id: PrincipalId) -> Result<()> {
        let actor = self.load_principal(actor_id).await?;
        let group = self.load_group(group_id).await?;
        if !can_delete_group(&actor, &group) {
            warn!(actor = %actor_id, group = %group_id, "group deletion refused");
            return Err(GroupError::DeleteNotAuthorized(group_id));
        }

        let members: Vec<PrincipalId> = group.member_ids.iter().copied().collect();
        for member in members {
            self.remove(member, group_id, actor_id).await?;
        }

        // Invariant 3: never delete a group that still has members. A
        // concurrent join between the cascade and this check is caught here.
        let group = self.load_group(group_id).await?;
        if !group.member_ids.is_empty() {
            return Err(GroupError::GroupNotEmpty {
                group: group_id,
                members: group.member_ids.len(),
            });
        }

        self.store.delete(&paths::group(group_id)).await?;
        info!(group = %group_id, actor = %actor_id, "group deleted");
        Ok(())
    }

    /// Pre-flight check used by UIs before committing an assignment.
    ///
    /// Rejects when groups are disabled, the group or user does not exist,
    /// or the user is already a member. Flags — but allows — the case where
    /// the user belongs to a *different* group, since [`assign`](Self::assign)
    /// will silently transfer them.
    pub async fn validate_assignment(
        &self,
        user_id: PrincipalId,
        group_id: GroupId,
    ) -> Result<AssignmentValidation> {
        let config = self.resolver.resolve().await;
        if !config.features.enable_groups {
            return Ok(AssignmentValidation::invalid("group management is disabled"));
        }

        let group = match self.load_group(group_id).await {
            Ok(group) => group,
            Err(GroupError::GroupNotFound(_)) => {
                return Ok(AssignmentValidation::invalid("group not found"));
            }
            Err(err) => return Err(err),
        };

        let principal = match self.load_principal(user_id).await {
            Ok(principal) => principal,
            Err(GroupError::PrincipalNotFound(_)) => {
                return Ok(AssignmentValidation::invalid("user not found"));
            }
            Err(err) => return Err(err),
        };

        if principal.group_id == Some(group_id) || group.has_member(user_id) {
            return Ok(AssignmentValidation::invalid(
                "user is already a member of this group",
            ));
        }

        if let Some(current) = principal.group_id {
            return Ok(AssignmentValidation::ok_with_warning(format!(
                "user will be transferred out of group {current}"
            )));
        }

        Ok(AssignmentValidation::ok())
    }
}
