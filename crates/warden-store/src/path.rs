//! Document and collection paths.
//!
//! Path strings alternate collection and id segments:
//! `users/<id>`, `groups/<id>/invites/<id>`. A document path therefore has
//! an even number of segments and a collection path an odd number. Parity is
//! enforced at construction and surfaced as [`StoreError::InvalidPath`]
//! rather than left to the backend.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

fn split_segments(raw: &str) -> Result<Vec<String>> {
    let segments: Vec<&str> = raw.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    Ok(segments.into_iter().map(str::to_string).collect())
}

/// Path addressing a single record: an even, non-zero number of segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Parses and validates a record path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] when the path is empty, contains
    /// an empty segment, or has an odd segment count (a collection path).
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let segments = split_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: format!(
                    "record path must have an even segment count, got {}",
                    segments.len()
                ),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Builds a top-level record path `collection/id`.
    pub fn record(collection: &str, id: impl Display) -> Result<Self> {
        Self::parse(format!("{collection}/{id}"))
    }

    /// The raw slash-separated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing id segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The collection this record lives in (everything before the final id).
    pub fn collection(&self) -> CollectionPath {
        let (collection, _) = self.0.rsplit_once('/').expect("validated even path");
        CollectionPath(collection.to_string())
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}

/// Path addressing a collection: an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parses and validates a collection path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] when the path is empty, contains
    /// an empty segment, or has an even segment count (a record path).
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let segments = split_segments(raw)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: format!(
                    "collection path must have an odd segment count, got {}",
                    segments.len()
                ),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// The raw slash-separated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The record path for `id` within this collection.
    ///
    /// # Panics
    ///
    /// Panics when `id` is empty or contains `/` — either would break the
    /// even-segment invariant [`DocPath`] guarantees.
    pub fn doc(&self, id: impl Display) -> DocPath {
        let id = id.to_string();
        assert!(
            !id.is_empty() && !id.contains('/'),
            "record id must be a single non-empty segment, got {id:?}"
        );
        DocPath(format!("{}/{id}", self.0))
    }

    /// Returns whether `path` is a direct child of this collection.
    pub fn contains(&self, path: &DocPath) -> bool {
        path.as_str()
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|id| !id.is_empty() && !id.contains('/'))
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}
