//! The facade's typed error taxonomy.
//!
//! Decision functions downstack return denials as values; the facade is
//! where denials and collaborator failures become typed errors. Five
//! categories:
//!
//! - [`PermissionDenied`](GovernanceError::PermissionDenied) — actor lacks
//!   role or ownership for the requested mutation.
//! - [`QuotaExceeded`](GovernanceError::QuotaExceeded) — a size or count
//!   ceiling was hit; the message names the numeric limit.
//! - [`NotFound`](GovernanceError::NotFound) — a referenced principal,
//!   group, or file does not exist.
//! - [`InvalidState`](GovernanceError::InvalidState) — structurally invalid
//!   request (malformed path, assigning a user to a group they are already
//!   in, deleting a non-empty group, ...).
//! - [`StoreUnavailable`](GovernanceError::StoreUnavailable) — the backend
//!   could not be reached. The one non-fatal category: list reads degrade
//!   to empty results instead of propagating it.

use thiserror::Error;
use warden_access::AccessError;
use warden_config::ConfigError;
use warden_groups::GroupError;
use warden_quota::QuotaError;
use warden_store::StoreError;

/// Typed error returned by every facade operation.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {reason}")]
    InvalidState { reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GovernanceError {
    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        GovernanceError::PermissionDenied {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        GovernanceError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Returns whether this is the non-fatal unavailability category.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GovernanceError::StoreUnavailable(_))
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => GovernanceError::StoreUnavailable(msg),
            StoreError::NotFound(path) => GovernanceError::NotFound {
                entity: "record",
                id: path,
            },
            other => GovernanceError::invalid(other.to_string()),
        }
    }
}

impl From<GroupError> for GovernanceError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::GroupNotFound(id) => GovernanceError::NotFound {
                entity: "group",
                id: id.to_string(),
            },
            GroupError::PrincipalNotFound(id) => GovernanceError::NotFound {
                entity: "user",
                id: id.to_string(),
            },
            GroupError::NotAuthorized { .. } | GroupError::DeleteNotAuthorized(_) => {
                GovernanceError::denied(err.to_string())
            }
            GroupError::AlreadyMember { .. }
            | GroupError::NotMember { .. }
            | GroupError::GroupNotEmpty { .. } => GovernanceError::invalid(err.to_string()),
            GroupError::Store(store) => store.into(),
        }
    }
}

impl From<AccessError> for GovernanceError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::FileNotFound(id) => GovernanceError::NotFound {
                entity: "file",
                id: id.to_string(),
            },
            AccessError::PrincipalNotFound(id) => GovernanceError::NotFound {
                entity: "user",
                id: id.to_string(),
            },
            AccessError::NotOwner => GovernanceError::denied(err.to_string()),
            AccessError::Store(store) => store.into(),
        }
    }
}

impl From<QuotaError> for GovernanceError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::PrincipalNotFound(id) => GovernanceError::NotFound {
                entity: "user",
                id: id.to_string(),
            },
            QuotaError::Store(store) => store.into(),
        }
    }
}

impl From<ConfigError> for GovernanceError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::PersistError(store) => store.into(),
            other => GovernanceError::invalid(other.to_string()),
        }
    }
}
