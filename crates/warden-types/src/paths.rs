//! Canonical record layout on the document store.
//!
//! Top-level collections:
//! - `users/<principal-id>` — [`Principal`](crate::Principal) records
//! - `groups/<group-id>` — [`Group`](crate::Group) records
//! - `files/<file-id>` — [`FileResource`](crate::FileResource) records
//! - `config/governance` — the singleton governance override record

use warden_store::{CollectionPath, DocPath};

use crate::{FileId, GroupId, PrincipalId};

pub const USERS: &str = "users";
pub const GROUPS: &str = "groups";
pub const FILES: &str = "files";

/// The `users` collection.
pub fn users() -> CollectionPath {
    CollectionPath::parse(USERS).expect("constant collection is valid")
}

/// The `groups` collection.
pub fn groups() -> CollectionPath {
    CollectionPath::parse(GROUPS).expect("constant collection is valid")
}

/// The `files` collection.
pub fn files() -> CollectionPath {
    CollectionPath::parse(FILES).expect("constant collection is valid")
}

/// Record path for a principal.
pub fn user(id: PrincipalId) -> DocPath {
    users().doc(id)
}

/// Record path for a group.
pub fn group(id: GroupId) -> DocPath {
    groups().doc(id)
}

/// Record path for a file's metadata.
pub fn file(id: FileId) -> DocPath {
    files().doc(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_paths_have_even_parity() {
        let id = PrincipalId::new();
        let path = user(id);
        assert_eq!(path.as_str(), format!("users/{id}"));
        assert_eq!(path.collection(), users());
    }
}
