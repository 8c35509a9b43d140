//! # warden-quota: Upload quota enforcement
//!
//! Computes the applicable file-size/file-count ceiling for a prospective
//! upload and decides whether it may proceed. Denial is a normal outcome
//! here — decisions come back as [`UploadDecision`] values carrying a
//! human-readable reason (with the numeric limit that was hit), never as
//! errors.
//!
//! ## Precedence
//!
//! First matching branch wins:
//!
//! 1. File management disabled → denied.
//! 2. Upload targeted at a group: the group's
//!    [`GroupPermissions`](warden_types::GroupPermissions) govern. Its
//!    `max_file_size` / `max_file_count` apply **when present**; an absent
//!    size limit falls back to the global `max_file_size`, while an absent
//!    count limit means group uploads are not counted against any ceiling.
//! 3. Personal upload: global `max_file_size`; the count ceiling is
//!    `max_file_count_with_group` when the principal belongs to *any*
//!    group, else `max_file_count` — group membership raises the personal
//!    ceiling even for uploads unrelated to that group.
//!
//! ## Atomicity
//!
//! [`QuotaEnforcer::can_upload`] performs only reads. The check-then-
//! increment step for personal uploads is [`QuotaEnforcer::reserve`], which
//! re-reads the principal's counter and stages the increment inside a single
//! store transaction — two concurrent uploads at the ceiling cannot both
//! commit.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use warden_config::{ConfigResolver, GovernanceConfig};
use warden_store::{Document, DocumentStore, StoreError, from_document};
use warden_types::{Group, GroupId, Principal, PrincipalId, paths};

/// Outcome of a quota evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadDecision {
    Allowed,
    Denied { reason: String },
}

impl UploadDecision {
    fn denied(reason: impl Into<String>) -> Self {
        UploadDecision::Denied {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, UploadDecision::Allowed)
    }

    /// The denial reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            UploadDecision::Allowed => None,
            UploadDecision::Denied { reason } => Some(reason),
        }
    }
}

/// Errors from the store-backed enforcement paths.
///
/// Quota denials are not errors; these cover missing records and
/// collaborator failures only.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A prospective upload to evaluate.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// File name, used for the allowed-type check. `None` skips that check.
    pub file_name: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Target group, when this is a group upload.
    pub group_id: Option<GroupId>,
}

impl UploadRequest {
    pub fn personal(file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: Some(file_name.into()),
            size,
            group_id: None,
        }
    }

    pub fn group(file_name: impl Into<String>, size: u64, group_id: GroupId) -> Self {
        Self {
            file_name: Some(file_name.into()),
            size,
            group_id: Some(group_id),
        }
    }

    fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

/// Formats a byte limit as MB with two decimals for denial messages.
fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Pure quota evaluation over already-loaded records.
///
/// `group` must be the loaded target group when `request.group_id` is set;
/// `group_file_count` the number of files currently stored in that group
/// (only consulted when the group configures `max_file_count`).
pub fn evaluate_upload(
    config: &GovernanceConfig,
    principal: &Principal,
    request: &UploadRequest,
    group: Option<&Group>,
    group_file_count: u32,
) -> UploadDecision {
    if !config.features.enable_file_management {
        return UploadDecision::denied("file management is disabled");
    }

    if request.group_id.is_some() {
        let Some(group) = group else {
            return UploadDecision::denied("group not found");
        };
        return evaluate_group_upload(config, request, group, group_file_count);
    }

    evaluate_personal_upload(config, principal, request)
}

fn check_file_type(allowed: &[String], request: &UploadRequest) -> Option<UploadDecision> {
    if allowed.is_empty() {
        return None;
    }
    let ext = request.extension();
    let permitted = ext
        .as_deref()
        .is_some_and(|e| allowed.iter().any(|t| t == e));
    if permitted {
        None
    } else {
        Some(UploadDecision::denied(format!(
            "file type {} is not allowed (allowed: {})",
            ext.as_deref().unwrap_or("<none>"),
            allowed.join(", ")
        )))
    }
}

fn evaluate_group_upload(
    config: &GovernanceConfig,
    request: &UploadRequest,
    group: &Group,
    group_file_count: u32,
) -> UploadDecision {
    let perms = group.permissions.as_ref();

    if let Some(perms) = perms {
        if !perms.can_upload_files {
            return UploadDecision::denied(format!(
                "group {} does not permit file uploads",
                group.name
            ));
        }
    }

    // Group allow-list overrides the global one when present.
    let allowed_types = perms
        .and_then(|p| p.allowed_file_types.as_deref())
        .unwrap_or(&config.allowed_file_types);
    if let Some(denied) = check_file_type(allowed_types, request) {
        return denied;
    }

    // Group size limit when configured, global otherwise.
    let max_size = perms
        .and_then(|p| p.max_file_size)
        .unwrap_or(config.quotas.max_file_size);
    if request.size > max_size {
        return UploadDecision::denied(format!(
            "file exceeds the maximum size of {}",
            format_mb(max_size)
        ));
    }

    // A count ceiling applies only when the group configures one. An
    // ungoverned group's uploads stay uncounted.
    if let Some(max_count) = perms.and_then(|p| p.max_file_count) {
        if group_file_count >= max_count {
            return UploadDecision::denied(format!(
                "group file count limit of {max_count} reached"
            ));
        }
    }

    UploadDecision::Allowed
}

fn evaluate_personal_upload(
    config: &GovernanceConfig,
    principal: &Principal,
    request: &UploadRequest,
) -> UploadDecision {
    if let Some(denied) = check_file_type(&config.allowed_file_types, request) {
        return denied;
    }

    if request.size > config.quotas.max_file_size {
        return UploadDecision::denied(format!(
            "file exceeds the maximum size of {}",
            format_mb(config.quotas.max_file_size)
        ));
    }

    // Membership in any group raises the personal ceiling, even for uploads
    // unrelated to that group.
    let max_count = if principal.group_id.is_some() {
        config.quotas.max_file_count_with_group
    } else {
        config.quotas.max_file_count
    };
    if principal.file_upload_count >= max_count {
        return UploadDecision::denied(format!("file count limit of {max_count} reached"));
    }

    UploadDecision::Allowed
}

/// Store-backed quota enforcement.
#[derive(Clone)]
pub struct QuotaEnforcer {
    store: Arc<dyn DocumentStore>,
    resolver: ConfigResolver,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn DocumentStore>, resolver: ConfigResolver) -> Self {
        Self { store, resolver }
    }

    async fn load_principal(&self, id: PrincipalId) -> Result<Principal, QuotaError> {
        let doc = self
            .store
            .get(&paths::user(id))
            .await?
            .ok_or(QuotaError::PrincipalNotFound(id))?;
        Ok(from_document(&doc)?)
    }

    async fn load_group(&self, id: GroupId) -> Result<Option<Group>, QuotaError> {
        match self.store.get(&paths::group(id)).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Number of file records currently stored in `group_id`.
    async fn group_file_count(&self, group_id: GroupId) -> Result<u32, QuotaError> {
        let files = self
            .store
            .list_where(&paths::files(), "group_id", &json!(group_id))
            .await?;
        Ok(files.len() as u32)
    }

    /// Read-only pre-flight check: may `user_id` upload this file?
    ///
    /// Performs no writes; the caller is responsible for the atomic
    /// check-then-increment step ([`reserve`](Self::reserve)).
    pub async fn can_upload(
        &self,
        user_id: PrincipalId,
        request: &UploadRequest,
    ) -> Result<UploadDecision, QuotaError> {
        let config = self.resolver.resolve().await;
        let principal = self.load_principal(user_id).await?;

        let (group, group_file_count) = match request.group_id {
            Some(group_id) => (
                self.load_group(group_id).await?,
                self.group_file_count(group_id).await?,
            ),
            None => (None, 0),
        };

        let decision = evaluate_upload(
            &config,
            &principal,
            request,
            group.as_ref(),
            group_file_count,
        );
        if let Some(reason) = decision.reason() {
            debug!(user = %user_id, reason, "upload denied");
        }
        Ok(decision)
    }

    /// Atomic check-then-reserve for an upload.
    ///
    /// For personal uploads the principal's counter is re-read and the
    /// increment staged inside one transaction, so concurrent uploads
    /// cannot overshoot the ceiling. Group uploads take no counter (group
    /// files never count against the personal quota).
    pub async fn reserve(
        &self,
        user_id: PrincipalId,
        request: &UploadRequest,
    ) -> Result<UploadDecision, QuotaError> {
        let config = self.resolver.resolve().await;

        // Group context is read outside the transaction: group uploads do
        // not mutate any counter, so there is no increment to race with.
        let (group, group_file_count) = match request.group_id {
            Some(group_id) => (
                self.load_group(group_id).await?,
                self.group_file_count(group_id).await?,
            ),
            None => (None, 0),
        };

        let user_path = paths::user(user_id);
        let mut tx = self.store.begin().await?;
        let principal: Principal = match tx.get(&user_path).await? {
            Some(doc) => from_document(&doc)?,
            None => return Err(QuotaError::PrincipalNotFound(user_id)),
        };

        let decision = evaluate_upload(
            &config,
            &principal,
            request,
            group.as_ref(),
            group_file_count,
        );
        if let UploadDecision::Denied { reason } = &decision {
            warn!(user = %user_id, reason, "upload reservation denied");
            return Ok(decision);
        }

        if request.group_id.is_none() {
            let mut patch = Document::new();
            patch.insert(
                "file_upload_count".to_string(),
                json!(principal.file_upload_count + 1),
            );
            patch.insert("last_file_upload_at".to_string(), json!(Utc::now()));
            patch.insert("updated_at".to_string(), json!(Utc::now()));
            tx.update(&user_path, patch);
            tx.commit().await?;
        }

        debug!(user = %user_id, size = request.size, "upload reserved");
        Ok(UploadDecision::Allowed)
    }

    /// Releases one reserved personal upload (file deleted), atomically
    /// decrementing the counter. Saturates at zero.
    pub async fn release(&self, user_id: PrincipalId) -> Result<(), QuotaError> {
        let user_path = paths::user(user_id);
        let mut tx = self.store.begin().await?;
        let principal: Principal = match tx.get(&user_path).await? {
            Some(doc) => from_document(&doc)?,
            None => return Err(QuotaError::PrincipalNotFound(user_id)),
        };

        let mut patch = Document::new();
        patch.insert(
            "file_upload_count".to_string(),
            json!(principal.file_upload_count.saturating_sub(1)),
        );
        patch.insert("updated_at".to_string(), json!(Utc::now()));
        tx.update(&user_path, patch);
        tx.commit().await?;
        Ok(())
    }
}
