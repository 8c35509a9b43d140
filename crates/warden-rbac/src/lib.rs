//! # warden-rbac: Role hierarchy and assignment authority
//!
//! Encodes the four-role hierarchy and the can-assign-role matrix used by
//! every user- and group-management entry point in the governance facade:
//!
//! | Actor     | May assign              | May manage users/groups |
//! |-----------|-------------------------|-------------------------|
//! | Admin     | admin, moderator, editor, user | ✓               |
//! | Moderator | editor, user            | ✓                       |
//! | Editor    | —                       | ✗                       |
//! | User      | —                       | ✗                       |
//!
//! This authority is pure — no I/O, no store access — and is exhaustively
//! table-tested. Denial is a normal outcome here: callers receive `false`
//! and turn it into a typed permission error at the trust boundary.

pub mod roles;

pub use roles::{Role, RoleParseError};

// ============================================================================
// Assignment authority
// ============================================================================

/// Returns whether `actor` may assign `target` to some principal.
///
/// The matrix, highest authority first:
/// - `Admin` may assign any of the four roles.
/// - `Moderator` may assign only `Editor` or `User` — never `Admin` or
///   `Moderator`, including to itself.
/// - `Editor` and `User` may assign nothing.
///
/// # Examples
///
/// ```
/// use warden_rbac::{can_assign_role, Role};
///
/// assert!(can_assign_role(Role::Admin, Role::Admin));
/// assert!(can_assign_role(Role::Moderator, Role::User));
/// assert!(!can_assign_role(Role::Moderator, Role::Moderator));
/// assert!(!can_assign_role(Role::Editor, Role::User));
/// ```
pub fn can_assign_role(actor: Role, target: Role) -> bool {
    let allowed = match actor {
        Role::Admin => true,
        Role::Moderator => matches!(target, Role::Editor | Role::User),
        Role::Editor | Role::User => false,
    };
    if !allowed {
        tracing::debug!(actor = %actor, target = %target, "role assignment refused");
    }
    allowed
}

/// Returns whether `actor` may enter user- and group-management operations.
///
/// True only for `Admin` and `Moderator`. The facade checks this before
/// every management mutation regardless of what the caller already checked.
pub fn can_manage(actor: Role) -> bool {
    matches!(actor, Role::Admin | Role::Moderator)
}
