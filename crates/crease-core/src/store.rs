// The storage collaborator contract.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::path::{CollectionPath, DocPath};
use crate::watch::Subscription;

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Decode the document body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

static AUTO_ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate an id for [`DocumentStore::add`]. Ids sort in creation order
/// within one process.
pub fn auto_id() -> String {
    let seq = AUTO_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let now = chrono::Utc::now();
    format!("{}{seq:06}", now.format("%Y%m%d%H%M%S%3f"))
}

/// Encode a typed value into a document body.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Full-document overwrite.
    Set { path: DocPath, data: Value },
    /// Create only if absent; fails the whole batch with
    /// [`StoreError::AlreadyExists`] otherwise.
    Create { path: DocPath, data: Value },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Create { path, .. } => path,
        }
    }
}

/// An ordered group of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set { path, data });
        self
    }

    pub fn create(&mut self, path: DocPath, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Create { path, data });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Document(DocPath),
    Collection(CollectionPath),
}

impl WatchTarget {
    /// Whether a write to `path` changes what this target observes.
    pub fn is_affected_by(&self, path: &DocPath) -> bool {
        match self {
            WatchTarget::Document(doc) => doc == path,
            WatchTarget::Collection(coll) => &path.parent() == coll,
        }
    }
}

/// The state of a watch target at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The watched document, or `None` if it does not exist.
    Document(Option<Document>),
    /// All documents of the watched collection, ordered by id.
    Collection(Vec<Document>),
}

/// Storage operations the application depends on.
///
/// Implementations deliver subscription snapshots for one target in the order
/// the writes were applied. Nothing is promised about ordering across targets.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, path: &DocPath) -> Result<Document, StoreError>;

    /// Read every document in a collection, ordered by id.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError>;

    /// Overwrite (or create) a document.
    async fn set(&self, path: &DocPath, data: Value) -> Result<(), StoreError>;

    /// Create a document with a store-assigned id. Returns the new id.
    async fn add(&self, collection: &CollectionPath, data: Value) -> Result<String, StoreError>;

    /// Atomically create a document only if it does not exist yet.
    async fn create(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.create(path.clone(), data);
        self.commit(batch).await
    }

    /// Apply every write in `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Watch a document or collection. The first snapshot is the current
    /// state; each later one follows a write that affected the target.
    fn subscribe(&self, target: WatchTarget) -> Result<Subscription, StoreError>;
}
