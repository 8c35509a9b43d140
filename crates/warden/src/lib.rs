//! # Warden: access control and resource governance
//!
//! Warden governs a mobile client's backend resources: who holds which
//! role, who belongs to which group, how much each principal may upload,
//! and who may read which file. It performs no I/O of its own — callers
//! inject a [`DocumentStore`](warden_store::DocumentStore) and a
//! [`BlobStore`](warden_store::BlobStore), and every decision is made
//! against the records behind those ports.
//!
//! The crate layers cleanly:
//!
//! - [`warden_types`] — plain data records (principals, groups, files)
//! - [`warden_store`] — the collaborator ports and in-memory adapters
//! - [`warden_config`] — layered deployment defaults plus stored overrides
//! - [`warden_rbac`] — the role lattice and assignment matrix
//! - [`warden_groups`] — bidirectional group membership
//! - [`warden_quota`] — upload size/count ceilings
//! - [`warden_access`] — per-file read eligibility and sharing
//! - this crate — the [`Warden`] facade, the single trust boundary
//!
//! ```no_run
//! use warden::{DeploymentDefaults, Warden};
//!
//! # async fn demo() -> warden::Result<()> {
//! let warden = Warden::in_memory(DeploymentDefaults::default());
//! let alice = warden.create_user("alice@example.com", "Alice").await?;
//! let files = warden.list_files(alice.id).await?;
//! assert!(files.is_empty());
//! # Ok(())
//! # }
//! ```

mod error;
mod warden;

pub use error::{GovernanceError, Result};
pub use warden::{FileUpload, GroupUpdate, Warden};

// The vocabulary callers need to drive the facade.
pub use warden_config::{
    ConfigError, DeploymentDefaults, DeploymentLoader, GovernanceConfig, GovernanceOverrides,
    Profile,
};
pub use warden_groups::AssignmentValidation;
pub use warden_quota::{UploadDecision, UploadRequest};
pub use warden_rbac::Role;
pub use warden_store::{BlobStore, DocumentStore, MemoryBlobStore, MemoryDocumentStore};
pub use warden_types::{
    FileId, FileKind, FileResource, Group, GroupId, GroupPermissions, Principal, PrincipalId,
};
