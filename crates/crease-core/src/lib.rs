// Storage and auth collaborators: document paths, the document-store
// contract with in-memory and SQLite implementations, subscriptions, and the
// user session.

pub mod auth;
pub mod error;
pub mod memory;
pub mod path;
pub mod sqlite;
pub mod store;
pub mod watch;

pub use auth::{Session, SignIn, UserId};
pub use error::{AuthError, StoreError};
pub use memory::MemoryStore;
pub use path::{CollectionPath, DocPath, Namespace};
pub use sqlite::SqliteStore;
pub use store::{auto_id, encode, Document, DocumentStore, Snapshot, WatchTarget, WriteBatch, WriteOp};
pub use watch::Subscription;
