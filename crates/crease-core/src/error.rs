// Error types for the storage and auth collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: String },

    #[error("document already exists: {path}")]
    AlreadyExists { path: String },

    /// Transient failure reaching the store. Safe to retry.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    /// Fault inside the backend itself: corruption, schema, or misuse.
    /// Retrying will not help.
    #[error("storage backend error: {message}")]
    Backend { message: String },

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("failed to encode or decode document: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid user id `{0}`: must be non-empty and contain no '/'")]
    InvalidUserId(String),

    #[error("auth token is empty")]
    EmptyToken,

    #[error("sign-in did not complete: {0}")]
    SignInFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::unavailable("timeout").is_transient());
        assert!(!StoreError::NotFound { path: "a/b".into() }.is_transient());
        assert!(!StoreError::AlreadyExists { path: "a/b".into() }.is_transient());
        assert!(!StoreError::backend("malformed database").is_transient());
    }

    #[test]
    fn messages_name_the_path() {
        let err = StoreError::NotFound {
            path: "artifacts/app".into(),
        };
        assert_eq!(err.to_string(), "document not found: artifacts/app");
    }
}
