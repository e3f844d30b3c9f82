// SQLite-backed document store.
//
// Every document is one row keyed by its full path; the parent collection is
// stored alongside so listings are a single indexed query. Bodies are JSON
// text.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::path::{CollectionPath, DocPath};
use crate::store::{auto_id, Document, DocumentStore, Snapshot, WatchTarget, WriteBatch, WriteOp};
use crate::watch::{Subscription, WatchRegistry};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: Arc<WatchRegistry>,
}

/// Busy, locked and I/O failures may clear up on retry; anything else is a
/// fault in the database or the query.
fn sql_err(action: &str, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure) => {
            StoreError::unavailable(format!("{action}: {e}"))
        }
        _ => StoreError::backend(format!("{action}: {e}")),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn read_document(conn: &Connection, path: &DocPath) -> Result<Option<Document>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE path = ?1",
            params![path.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| sql_err("failed to read document", e))?;

    match raw {
        Some(json_str) => Ok(Some(Document {
            path: path.clone(),
            data: serde_json::from_str(&json_str)?,
        })),
        None => Ok(None),
    }
}

fn read_collection(conn: &Connection, coll: &CollectionPath) -> Result<Vec<Document>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT path, data FROM documents WHERE collection = ?1 ORDER BY path")
        .map_err(|e| sql_err("failed to prepare list query", e))?;

    let rows = stmt
        .query_map(params![coll.as_str()], |row| {
            let path: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((path, data))
        })
        .map_err(|e| sql_err("failed to list documents", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sql_err("failed to map document rows", e))?;

    let mut docs = Vec::with_capacity(rows.len());
    for (path, data) in rows {
        docs.push(Document {
            path: DocPath::parse(&path)?,
            data: serde_json::from_str(&data)?,
        });
    }
    Ok(docs)
}

fn read_snapshot(conn: &Connection, target: &WatchTarget) -> Result<Snapshot, StoreError> {
    match target {
        WatchTarget::Document(path) => Ok(Snapshot::Document(read_document(conn, path)?)),
        WatchTarget::Collection(coll) => Ok(Snapshot::Collection(read_collection(conn, coll)?)),
    }
}

impl SqliteStore {
    /// Open (or create) a store at `path`. Pass `":memory:"` for an ephemeral
    /// database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| sql_err(&format!("failed to open database at {path}"), e))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| sql_err("failed to set database pragmas", e))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                path       TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                data       TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )
        .map_err(|e| sql_err("failed to create database schema", e))?;

        info!("Document store opened at {}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            watchers: WatchRegistry::new(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::unavailable("database mutex poisoned"))
    }

    /// Total number of stored documents.
    pub fn document_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| sql_err("failed to count documents", e))?;
        Ok(count as usize)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.watchers.active_count()
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| sql_err("failed to begin transaction", e))?;

        for op in batch.ops() {
            match op {
                WriteOp::Set { path, data } => {
                    let json_str = serde_json::to_string(data)?;
                    tx.execute(
                        "INSERT INTO documents (path, collection, data) VALUES (?1, ?2, ?3)
                         ON CONFLICT(path) DO UPDATE SET
                            data       = excluded.data,
                            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                        params![path.as_str(), path.parent().as_str(), json_str],
                    )
                    .map_err(|e| sql_err("failed to write document", e))?;
                }
                WriteOp::Create { path, data } => {
                    let json_str = serde_json::to_string(data)?;
                    tx.execute(
                        "INSERT INTO documents (path, collection, data) VALUES (?1, ?2, ?3)",
                        params![path.as_str(), path.parent().as_str(), json_str],
                    )
                    .map_err(|e| {
                        if is_constraint_violation(&e) {
                            StoreError::AlreadyExists {
                                path: path.to_string(),
                            }
                        } else {
                            sql_err("failed to create document", e)
                        }
                    })?;
                }
            }
        }

        // An early return above drops `tx`, which rolls the batch back.
        tx.commit()
            .map_err(|e| sql_err("failed to commit write batch", e))?;
        debug!("Committed {} write(s)", batch.len());

        let paths: Vec<&DocPath> = batch.ops().iter().map(WriteOp::path).collect();
        if self.watchers.has_watchers_for(&paths) {
            self.watchers.notify(&paths, |target| match read_snapshot(&conn, target) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Skipping snapshot for {:?}: {}", target, e);
                    None
                }
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> Result<Document, StoreError> {
        let conn = self.conn()?;
        read_document(&conn, path)?.ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;
        read_collection(&conn, collection)
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
        let conn = self.conn()?;
        let initial = read_snapshot(&conn, &target)?;
        Ok(self.watchers.register(target, initial))
    }
}
