//! Role definitions.
//!
//! Defines 4 roles with escalating authority:
//! - User: ordinary account (least authority)
//! - Editor: content editing, no management rights
//! - Moderator: may manage users and groups, may grant editor/user
//! - Admin: full authority (most)

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role held by a principal.
///
/// Roles are ordered from least to most authority:
/// User < Editor < Moderator < Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary account.
    ///
    /// **Authority:**
    /// - Owns personal files subject to quota
    /// - May share files it owns
    /// - Cannot manage users or groups
    /// - Cannot assign any role
    User,

    /// Content editor.
    ///
    /// **Authority:**
    /// - Everything `User` can do
    /// - Edits shared application content (enforced outside this core)
    /// - Cannot manage users or groups
    /// - Cannot assign any role
    Editor,

    /// Moderator with user- and group-management rights.
    ///
    /// **Authority:**
    /// - Manages users and groups
    /// - May grant `editor` or `user` — never `admin` or `moderator`,
    ///   including to itself
    /// - Bypasses file ownership checks for read access
    Moderator,

    /// Administrator with full authority.
    ///
    /// **Authority:**
    /// - May grant any role
    /// - Manages users, groups, and the governance configuration
    /// - Bypasses file ownership checks for read access
    Admin,
}

impl Role {
    /// Numeric authority rank; higher means more authority.
    ///
    /// Used where a total order over roles is clearer than match arms.
    pub fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Editor => 1,
            Role::Moderator => 2,
            Role::Admin => 3,
        }
    }

    /// Canonical lowercase name as stored in principal records.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Editor => "editor",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// All roles, lowest authority first.
    pub const ALL: [Role; 4] = [Role::User, Role::Editor, Role::Moderator, Role::Admin];
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a role name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role: {0:?}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "editor" => Ok(Role::Editor),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}
