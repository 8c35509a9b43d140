//! Error types for store collaborators.

use thiserror::Error;

/// Errors surfaced by the document- and blob-store ports.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed record or collection path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Create targeted an existing record.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Transaction could not commit due to a conflicting write.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached or is not configured.
    ///
    /// Callers treat this as non-fatal where the product must stay
    /// partially usable without a backend (list reads degrade to empty).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Record payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns whether this error is the non-fatal unavailability category.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
