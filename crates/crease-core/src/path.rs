// Document and collection paths, plus the public/private namespace layout.
//
// Paths are slash-separated segment lists. A collection path has an odd number
// of segments (`artifacts/app/public`), a document path an even number
// (`artifacts/app/public/data`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::UserId;
use crate::error::StoreError;

/// Root collection under which every application keeps its data.
pub const ROOT_COLLECTION: &str = "artifacts";

fn validate_segments(raw: &str) -> Result<Vec<&str>, StoreError> {
    if raw.is_empty() {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "path is empty".into(),
        });
    }
    let segments: Vec<&str> = raw.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "path contains an empty segment".into(),
        });
    }
    Ok(segments)
}

/// Path to a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse a collection path. Fails unless the segment count is odd.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments = validate_segments(raw)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: "collection paths need an odd number of segments".into(),
            });
        }
        Ok(CollectionPath(raw.to_string()))
    }

    /// Path of the document `id` inside this collection.
    ///
    /// `id` must be a single segment; slashes are rejected.
    pub fn doc(&self, id: &str) -> Result<DocPath, StoreError> {
        if id.is_empty() || id.contains('/') {
            return Err(StoreError::InvalidPath {
                path: format!("{}/{}", self.0, id),
                reason: "document id must be a single non-empty segment".into(),
            });
        }
        Ok(DocPath(format!("{}/{}", self.0, id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath(String);

impl DocPath {
    /// Parse a document path. Fails unless the segment count is even.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments = validate_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: "document paths need an even number of segments".into(),
            });
        }
        Ok(DocPath(raw.to_string()))
    }

    /// The final segment: the document's id within its collection.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The collection this document lives in.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    /// A subcollection nested under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        CollectionPath::parse(&format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A data namespace: either the shared public area of an application or a
/// single user's private area.
///
/// - public:  `artifacts/{app_id}/public/data/{collection}`
/// - private: `artifacts/{app_id}/users/{user_id}/{collection}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: DocPath,
}

impl Namespace {
    pub fn public(app_id: &str) -> Result<Self, StoreError> {
        let root = DocPath::parse(&format!("{ROOT_COLLECTION}/{app_id}/public/data"))?;
        Ok(Namespace { root })
    }

    pub fn private(app_id: &str, user: &UserId) -> Result<Self, StoreError> {
        let root = DocPath::parse(&format!(
            "{ROOT_COLLECTION}/{app_id}/users/{}",
            user.as_str()
        ))?;
        Ok(Namespace { root })
    }

    /// A collection inside this namespace.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        self.root.collection(name)
    }

    /// Shorthand for `collection(name)?.doc(id)`.
    pub fn doc(&self, collection: &str, id: &str) -> Result<DocPath, StoreError> {
        self.collection(collection)?.doc(id)
    }
}
