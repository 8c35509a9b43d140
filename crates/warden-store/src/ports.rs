//! The consumed collaborator traits (driven ports).

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::path::{CollectionPath, DocPath};

/// A stored record: a JSON object at the store boundary.
///
/// Typed records (principals, groups, files) are converted at the edges
/// with [`to_document`] / [`from_document`]; everything above the port
/// works with typed structs.
pub type Document = serde_json::Map<String, Value>;

/// Serializes a typed record into a store [`Document`].
///
/// # Errors
///
/// Returns [`StoreError::Serialization`](crate::StoreError::Serialization)
/// when the value does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(serde_json::Error::io(std::io::Error::other(format!(
            "record must serialize to an object, got {other}"
        )))
        .into()),
    }
}

/// Deserializes a typed record out of a store [`Document`].
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub path: DocPath,
    /// The record after the change, `None` when it was deleted.
    pub doc: Option<Document>,
}

/// A single staged write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Full overwrite (upsert).
    Set { path: DocPath, doc: Document },
    /// Shallow field merge into an existing record.
    Update { path: DocPath, patch: Document },
    /// Record removal.
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => {
                path
            }
        }
    }
}

/// An ordered set of writes committed atomically.
///
/// Build with [`set`](Self::set)/[`update`](Self::update)/
/// [`delete`](Self::delete), then hand to
/// [`DocumentStore::commit_batch`]. Unlike a [`Transaction`], a batch takes
/// no reads and holds no isolation guarantee beyond the atomic commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, doc: Document) -> &mut Self {
        self.ops.push(WriteOp::Set { path, doc });
        self
    }

    pub fn update(&mut self, path: DocPath, patch: Document) -> &mut Self {
        self.ops.push(WriteOp::Update { path, patch });
        self
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// A serializable read-write transaction.
///
/// Reads observe earlier staged writes from the same transaction
/// (read-your-writes). Nothing is visible to other callers until
/// [`commit`](Self::commit); dropping the transaction without committing
/// discards all staged writes.
#[async_trait]
pub trait Transaction: Send {
    /// Reads a record, observing this transaction's staged writes.
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>>;

    /// Stages a full overwrite (upsert).
    fn set(&mut self, path: &DocPath, doc: Document);

    /// Stages a shallow field merge; fails at commit when the record is
    /// missing.
    fn update(&mut self, path: &DocPath, patch: Document);

    /// Stages a record removal.
    fn delete(&mut self, path: &DocPath);

    /// Atomically applies every staged write.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Record storage addressed by alternating collection/id paths.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a single record. `Ok(None)` when absent.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Lists all records directly inside `collection`.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(DocPath, Document)>>;

    /// Lists the records in `collection` whose `field` equals `value`.
    ///
    /// The default implementation fetches the collection and filters
    /// client-side; a backend with native query support should override it
    /// and push the predicate down.
    async fn list_where(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(DocPath, Document)>> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .filter(|(_, doc)| doc.get(field) == Some(value))
            .collect())
    }

    /// Creates a record; fails with `AlreadyExists` when present.
    async fn create(&self, path: &DocPath, doc: Document) -> Result<()>;

    /// Creates a record under a generated id, returning its path.
    async fn create_with_generated_id(
        &self,
        collection: &CollectionPath,
        doc: Document,
    ) -> Result<DocPath>;

    /// Shallow-merges `patch` into an existing record; fails with
    /// `NotFound` when absent.
    async fn update(&self, path: &DocPath, patch: Document) -> Result<()>;

    /// Removes a record. Removing an absent record is not an error.
    async fn delete(&self, path: &DocPath) -> Result<()>;

    /// Subscribes to changes of a single record. Dropping the receiver
    /// unsubscribes.
    async fn subscribe(&self, path: &DocPath) -> Result<broadcast::Receiver<StoreEvent>>;

    /// Opens a serializable transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Atomically applies a pre-built batch of writes.
    async fn commit_batch(&self, batch: WriteBatch) -> Result<()>;
}

/// Result of a blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub download_url: String,
    pub size: u64,
}

/// Opaque byte storage for file contents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path`, returning the download URL and stored size.
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<PutResult>;

    /// Returns the download URL for an existing blob.
    async fn url(&self, path: &str) -> Result<String>;

    /// Removes a blob. Removing an absent blob is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Applies a shallow field merge of `patch` into `doc`.
///
/// Top-level fields in `patch` replace fields in `doc`; nested objects are
/// replaced wholesale, not merged.
pub fn merge_document(doc: &mut Document, patch: Document) {
    for (key, value) in patch {
        doc.insert(key, value);
    }
}
