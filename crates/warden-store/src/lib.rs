//! # warden-store: Collaborator ports for `Warden`
//!
//! The governance engine performs no I/O of its own. It consumes two
//! abstract collaborators, defined here as async traits (driven ports):
//!
//! - [`DocumentStore`] — record storage addressed by slash-separated paths
//!   that alternate collection and id segments, with shallow-merge updates,
//!   change subscriptions, atomic [`WriteBatch`]es, and serializable
//!   [`Transaction`]s.
//! - [`BlobStore`] — opaque byte storage for file contents.
//!
//! Production deployments implement these traits against a managed backend.
//! This crate also ships [`MemoryDocumentStore`] and [`MemoryBlobStore`],
//! mutex-guarded in-process adapters used by the test suites and local runs.
//!
//! ## Transactions
//!
//! Invariant-critical write pairs (group reassignment, quota
//! check-then-increment) must commit atomically. [`DocumentStore::begin`]
//! returns a [`Transaction`] with read-your-writes semantics; the memory
//! adapter holds the store lock for the transaction's lifetime, so commits
//! are serializable. A real backend maps this onto its native transaction
//! primitive.

pub mod error;
pub mod memory;
pub mod path;
pub mod ports;

pub use error::{Result, StoreError};
pub use memory::{MemoryBlobStore, MemoryDocumentStore};
pub use path::{CollectionPath, DocPath};
pub use ports::{
    BlobStore, Document, DocumentStore, PutResult, StoreEvent, Transaction, WriteBatch, WriteOp,
    from_document, to_document,
};
