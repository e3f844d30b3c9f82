// In-process document store.
//
// Used by tests and by the `memory` storage backend. Transient failures can be
// injected with `fail_next_writes` to exercise retry and rollback paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::path::{CollectionPath, DocPath};
use crate::store::{auto_id, Document, DocumentStore, Snapshot, WatchTarget, WriteBatch, WriteOp};
use crate::watch::{Subscription, WatchRegistry};

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocPath, Value>>,
    watchers: Arc<WatchRegistry>,
    pending_failures: AtomicUsize,
    committed_writes: AtomicU64,
}

fn snapshot_of(docs: &BTreeMap<DocPath, Value>, target: &WatchTarget) -> Snapshot {
    match target {
        WatchTarget::Document(path) => Snapshot::Document(docs.get(path).map(|data| Document {
            path: path.clone(),
            data: data.clone(),
        })),
        WatchTarget::Collection(coll) => Snapshot::Collection(collect(docs, coll)),
    }
}

fn collect(docs: &BTreeMap<DocPath, Value>, coll: &CollectionPath) -> Vec<Document> {
    // Siblings share the `coll/` prefix, so map order is id order.
    docs.iter()
        .filter(|(path, _)| &path.parent() == coll)
        .map(|(path, data)| Document {
            path: path.clone(),
            data: data.clone(),
        })
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> Result<MutexGuard<'_, BTreeMap<DocPath, Value>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    /// Make the next `n` write calls fail with [`StoreError::Unavailable`]
    /// without touching any data.
    pub fn fail_next_writes(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of individual document writes applied so far.
    pub fn committed_writes(&self) -> u64 {
        self.committed_writes.load(Ordering::SeqCst)
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.docs().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_subscriptions(&self) -> usize {
        self.watchers.active_count()
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            warn!("Injected storage failure");
            return Err(StoreError::unavailable("injected failure"));
        }
        Ok(())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        let mut docs = self.docs()?;

        // Validate every create before touching anything.
        let mut created: HashSet<&DocPath> = HashSet::new();
        for op in batch.ops() {
            if let WriteOp::Create { path, .. } = op {
                if docs.contains_key(path) || !created.insert(path) {
                    return Err(StoreError::AlreadyExists {
                        path: path.to_string(),
                    });
                }
            }
        }

        for op in batch.ops() {
            match op {
                WriteOp::Set { path, data } | WriteOp::Create { path, data } => {
                    docs.insert(path.clone(), data.clone());
                }
            }
        }
        self.committed_writes
            .fetch_add(batch.len() as u64, Ordering::SeqCst);
        debug!("Applied {} write(s)", batch.len());

        let paths: Vec<&DocPath> = batch.ops().iter().map(WriteOp::path).collect();
        self.watchers
            .notify(&paths, |target| Some(snapshot_of(&docs, target)));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Document, StoreError> {
        let docs = self.docs()?;
        docs.get(path)
            .map(|data| Document {
                path: path.clone(),
                data: data.clone(),
            })
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs()?;
        Ok(collect(&docs, collection))
    }

    async fn set(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(path.clone(), data);
        self.apply(&batch)
    }

    async fn add(&self, collection: &CollectionPath, data: Value) -> Result<String, StoreError> {
        let id = auto_id();
        let mut batch = WriteBatch::new();
        batch.create(collection.doc(&id)?, data);
        self.apply(&batch)?;
        Ok(id)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.apply(&batch)
    }

    fn subscribe(&self, target: WatchTarget) -> Result<Subscription, StoreError> {
        let docs = self.docs()?;
        let initial = snapshot_of(&docs, &target);
        Ok(self.watchers.register(target, initial))
    }
}
