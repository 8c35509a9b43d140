//! In-memory adapters for the store ports.
//!
//! Used by the test suites and for local runs without a configured backend.
//! Records live in a mutex-guarded `BTreeMap`; a [`Transaction`] holds the
//! map lock for its whole lifetime, so transactions are serializable and a
//! committed write pair can never be observed half-applied.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::path::{CollectionPath, DocPath};
use crate::ports::{
    BlobStore, Document, DocumentStore, PutResult, StoreEvent, Transaction, WriteBatch, WriteOp,
    merge_document,
};

type DocMap = BTreeMap<DocPath, Document>;

/// In-process [`DocumentStore`] backed by a mutex-guarded map.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<Mutex<DocMap>>,
    watchers: Arc<Mutex<BTreeMap<DocPath, broadcast::Sender<StoreEvent>>>>,
    id_seq: Arc<AtomicU64>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored. Test helper.
    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    async fn notify(&self, path: &DocPath, doc: Option<&Document>) {
        let mut watchers = self.watchers.lock().await;
        if let Some(sender) = watchers.get(path) {
            let event = StoreEvent {
                path: path.clone(),
                doc: doc.cloned(),
            };
            // A send error just means every receiver was dropped.
            if sender.send(event).is_err() {
                watchers.remove(path);
            }
        }
    }

    async fn notify_ops(&self, docs: &DocMap, ops: &[WriteOp]) {
        for op in ops {
            let path = op.path();
            self.notify(path, docs.get(path)).await;
        }
    }

    fn apply_ops(docs: &mut DocMap, ops: &[WriteOp]) -> Result<()> {
        // Validate update targets against the staged state first, so a
        // failing batch applies nothing.
        let mut created: std::collections::BTreeSet<&DocPath> = std::collections::BTreeSet::new();
        let mut deleted: std::collections::BTreeSet<&DocPath> = std::collections::BTreeSet::new();
        for op in ops {
            match op {
                WriteOp::Set { path, .. } => {
                    created.insert(path);
                    deleted.remove(path);
                }
                WriteOp::Delete { path } => {
                    deleted.insert(path);
                    created.remove(path);
                }
                WriteOp::Update { path, .. } => {
                    let present = created.contains(path)
                        || (docs.contains_key(path) && !deleted.contains(path));
                    if !present {
                        return Err(StoreError::NotFound(path.to_string()));
                    }
                }
            }
        }
        for op in ops {
            match op {
                WriteOp::Set { path, doc } => {
                    docs.insert(path.clone(), doc.clone());
                }
                WriteOp::Update { path, patch } => {
                    let doc = docs
                        .get_mut(path)
                        .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                    merge_document(doc, patch.clone());
                }
                WriteOp::Delete { path } => {
                    docs.remove(path);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self.docs.lock().await.get(path).cloned())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(DocPath, Document)>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .iter()
            .filter(|(path, _)| collection.contains(path))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    async fn create(&self, path: &DocPath, doc: Document) -> Result<()> {
        {
            let mut docs = self.docs.lock().await;
            if docs.contains_key(path) {
                return Err(StoreError::AlreadyExists(path.to_string()));
            }
            docs.insert(path.clone(), doc.clone());
        }
        self.notify(path, Some(&doc)).await;
        Ok(())
    }

    async fn create_with_generated_id(
        &self,
        collection: &CollectionPath,
        doc: Document,
    ) -> Result<DocPath> {
        let id = self.id_seq.fetch_add(1, Ordering::Relaxed);
        let path = collection.doc(format!("gen-{id:08x}"));
        self.create(&path, doc).await?;
        Ok(path)
    }

    async fn update(&self, path: &DocPath, patch: Document) -> Result<()> {
        let updated = {
            let mut docs = self.docs.lock().await;
            let doc = docs
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            merge_document(doc, patch);
            doc.clone()
        };
        self.notify(path, Some(&updated)).await;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        let removed = self.docs.lock().await.remove(path).is_some();
        if removed {
            self.notify(path, None).await;
        }
        Ok(())
    }

    async fn subscribe(&self, path: &DocPath) -> Result<broadcast::Receiver<StoreEvent>> {
        let mut watchers = self.watchers.lock().await;
        let sender = watchers
            .entry(path.clone())
            .or_insert_with(|| broadcast::channel(64).0);
        Ok(sender.subscribe())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.docs).lock_owned().await;
        debug!("memory transaction opened");
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            guard,
            staged: Vec::new(),
        }))
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<()> {
        let ops = batch.into_ops();
        let snapshot = {
            let mut docs = self.docs.lock().await;
            Self::apply_ops(&mut docs, &ops)?;
            docs.clone()
        };
        self.notify_ops(&snapshot, &ops).await;
        Ok(())
    }
}

/// Transaction over [`MemoryDocumentStore`].
///
/// Holds the store lock from `begin` to commit/drop, giving serializable
/// isolation. Reads see staged writes from this transaction.
struct MemoryTransaction {
    store: MemoryDocumentStore,
    guard: OwnedMutexGuard<DocMap>,
    staged: Vec<WriteOp>,
}

impl MemoryTransaction {
    fn staged_view(&self, path: &DocPath) -> Option<Option<Document>> {
        // Last staged op on this path wins.
        let mut view: Option<Option<Document>> = None;
        for op in &self.staged {
            if op.path() != path {
                continue;
            }
            view = Some(match op {
                WriteOp::Set { doc, .. } => Some(doc.clone()),
                WriteOp::Delete { .. } => None,
                WriteOp::Update { patch, .. } => {
                    let base = match view {
                        Some(v) => v,
                        None => self.guard.get(path).cloned(),
                    };
                    base.map(|mut doc| {
                        merge_document(&mut doc, patch.clone());
                        doc
                    })
                }
            });
        }
        view
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>> {
        if let Some(view) = self.staged_view(path) {
            return Ok(view);
        }
        Ok(self.guard.get(path).cloned())
    }

    fn set(&mut self, path: &DocPath, doc: Document) {
        self.staged.push(WriteOp::Set {
            path: path.clone(),
            doc,
        });
    }

    fn update(&mut self, path: &DocPath, patch: Document) {
        self.staged.push(WriteOp::Update {
            path: path.clone(),
            patch,
        });
    }

    fn delete(&mut self, path: &DocPath) {
        self.staged.push(WriteOp::Delete { path: path.clone() });
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let ops = std::mem::take(&mut self.staged);
        MemoryDocumentStore::apply_ops(&mut self.guard, &ops)?;
        debug!(writes = ops.len(), "memory transaction committed");
        let store = self.store.clone();
        // Release the lock before notifying so subscribers can re-read.
        let snapshot: DocMap = self.guard.clone();
        drop(self);
        store.notify_ops(&snapshot, &ops).await;
        Ok(())
    }
}

/// In-process [`BlobStore`] keeping blobs in a mutex-guarded map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, (Bytes, String)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored bytes for `path`, if any. Test helper.
    pub async fn bytes(&self, path: &str) -> Option<Bytes> {
        self.blobs.lock().await.get(path).map(|(b, _)| b.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<PutResult> {
        let size = bytes.len() as u64;
        self.blobs
            .lock()
            .await
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(PutResult {
            download_url: format!("memory://{path}"),
            size,
        })
    }

    async fn url(&self, path: &str) -> Result<String> {
        let blobs = self.blobs.lock().await;
        if blobs.contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.lock().await.remove(path);
        Ok(())
    }
}
