//! # warden-types: Core types for `Warden`
//!
//! This crate contains shared types used across the `Warden` governance
//! engine:
//! - Entity IDs ([`PrincipalId`], [`GroupId`], [`FileId`])
//! - Principal accounts ([`Principal`], [`Role`] lives in `warden-rbac`)
//! - Groups and per-group permission overrides ([`Group`], [`GroupPermissions`])
//! - File metadata ([`FileResource`], [`FileKind`])
//! - Temporal types ([`Timestamp`])
//!
//! These are plain data records. Every governance decision about them —
//! who may hold which role, who may join which group, who may read which
//! file — lives in the decision crates layered above this one.

use std::collections::BTreeSet;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_rbac::Role;

/// Point in time, UTC. All record timestamps use this alias.
pub type Timestamp = DateTime<Utc>;

pub mod paths;

// ============================================================================
// Entity IDs - UUID-backed newtypes
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Parses from the canonical hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a principal (an authenticated user account).
    PrincipalId
}

entity_id! {
    /// Unique identifier for a group.
    GroupId
}

entity_id! {
    /// Unique identifier for a stored file's metadata record.
    FileId
}

// ============================================================================
// Principal
// ============================================================================

/// An authenticated account subject to role and quota rules.
///
/// Created at signup (an external identity event); mutated by role
/// assignment, group assignment, and file-count bookkeeping. Principals are
/// never hard-deleted by the governance core.
///
/// # Invariants
///
/// - `group_id` is `None` or references exactly one existing [`Group`], and
///   that group's `member_ids` contains this principal's id iff `group_id`
///   points to it.
/// - `file_upload_count` equals the number of personal files this principal
///   currently owns that count against quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// The at-most-one group this principal belongs to.
    pub group_id: Option<GroupId>,
    /// Number of personal files currently counted against quota.
    pub file_upload_count: u32,
    pub last_file_upload_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Principal {
    /// Creates a new principal with the default `user` role and no group.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PrincipalId::new(),
            email: email.into(),
            display_name: display_name.into(),
            role: Role::User,
            group_id: None,
            file_upload_count: 0,
            last_file_upload_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Group
// ============================================================================

/// A named collection of principals with one owner and optional per-group
/// quota/permission overrides.
///
/// A group's `member_ids` and each member principal's `group_id` must always
/// agree (the bidirectional membership invariant). Groups can only be deleted
/// after every member has been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub owner_id: PrincipalId,
    pub member_ids: BTreeSet<PrincipalId>,
    /// When present, overrides the global quota/permission defaults for
    /// uploads targeted at this group.
    pub permissions: Option<GroupPermissions>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        owner_id: PrincipalId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.into(),
            description: description.into(),
            owner_id,
            member_ids: BTreeSet::new(),
            permissions: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the principal is currently a member.
    pub fn has_member(&self, id: PrincipalId) -> bool {
        self.member_ids.contains(&id)
    }
}

/// Per-group permission flags and quota overrides.
///
/// `max_file_size`, `max_file_count`, and `allowed_file_types` are optional:
/// when absent, group uploads fall back to the global configuration for file
/// size (and carry no per-group count ceiling at all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupPermissions {
    pub can_upload_files: bool,
    pub can_delete_files: bool,
    pub can_share_files: bool,
    pub can_manage_members: bool,
    pub can_edit_group: bool,
    pub can_view_files: bool,
    /// Group-level max file size in bytes; overrides the global limit.
    pub max_file_size: Option<u64>,
    /// Group-level max file count; no fallback when absent.
    pub max_file_count: Option<u32>,
    /// Group-level allow-list of file extensions; overrides the global list.
    pub allowed_file_types: Option<Vec<String>>,
}

impl Default for GroupPermissions {
    fn default() -> Self {
        Self {
            can_upload_files: true,
            can_delete_files: false,
            can_share_files: true,
            can_manage_members: false,
            can_edit_group: false,
            can_view_files: true,
            max_file_size: None,
            max_file_count: None,
            allowed_file_types: None,
        }
    }
}

// ============================================================================
// Files
// ============================================================================

/// Category of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Owned by a single principal and counted against their quota.
    Personal,
    /// Shipped with the application; readable by everyone.
    App,
    /// Belongs to a group; readable by current members of that group.
    Group,
}

/// Metadata record for a stored file.
///
/// The bytes themselves live in the blob store at `storage_path`; this record
/// carries everything access evaluation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResource {
    pub id: FileId,
    pub name: String,
    pub kind: FileKind,
    pub owner_id: PrincipalId,
    /// Set iff `kind == Group`.
    pub group_id: Option<GroupId>,
    pub storage_path: String,
    pub mime_type: String,
    pub size: u64,
    /// Explicit per-file grant list, beyond ownership/role/public/group rules.
    pub accessible_by: BTreeSet<PrincipalId>,
    pub is_public: bool,
    pub is_app_file: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl FileResource {
    /// Creates a personal file record owned by `owner_id`.
    pub fn personal(
        name: impl Into<String>,
        owner_id: PrincipalId,
        storage_path: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FileId::new(),
            name: name.into(),
            kind: FileKind::Personal,
            owner_id,
            group_id: None,
            storage_path: storage_path.into(),
            mime_type: mime_type.into(),
            size,
            accessible_by: BTreeSet::new(),
            is_public: false,
            is_app_file: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a group file record owned by `owner_id` in `group_id`.
    pub fn group(
        name: impl Into<String>,
        owner_id: PrincipalId,
        group_id: GroupId,
        storage_path: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        let mut file = Self::personal(name, owner_id, storage_path, mime_type, size);
        file.kind = FileKind::Group;
        file.group_id = Some(group_id);
        file
    }

    /// Returns the lowercase extension of `name`, if any.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}
