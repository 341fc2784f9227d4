//! SQLite-backed memory store (§4.D).
//!
//! One keyed store over three logical namespaces: `meta` (KV strings),
//! `objects` (embedding blobs), and `memories` (per-scope JSON-ish
//! records). All operations dispatch onto the blocking thread pool via
//! `tokio::task::spawn_blocking`, since `rusqlite::Connection` is
//! synchronous.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::MemoryError;

/// Which namespace a memory record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryScope {
    /// Shared across every project.
    Global,
    /// Scoped to one project path.
    Project(String),
}

impl MemoryScope {
    fn tag(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Project(_) => "project",
        }
    }

    fn project_path(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Project(path) => Some(path.as_str()),
        }
    }
}

/// A single memory record (§3/§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable identifier.
    pub id: String,
    /// Free-form category tag (e.g. "preference", "fact").
    pub category: String,
    /// Which namespace this record lives in.
    pub scope: MemoryScope,
    /// How important this record is, used by retention sweeps and recall.
    pub importance: f64,
    /// Times this record has been accessed via `touch`.
    pub access_count: i64,
    /// Unix timestamp (seconds) of creation. Never changes across updates.
    pub created_at: i64,
    /// Unix timestamp (seconds) of the last `put`.
    pub updated_at: i64,
    /// Unix timestamp (seconds) of the last `touch`, if any.
    pub last_accessed_at: Option<i64>,
    /// The record body.
    pub content: String,
    /// Free-form key/value metadata attached to the record.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl MemoryRecord {
    /// Construct a new record with `created_at`/`updated_at` stamped to now
    /// and empty access accounting.
    pub fn new(id: impl Into<String>, category: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: id.into(),
            category: category.into(),
            scope: MemoryScope::Global,
            importance: 0.5,
            access_count: 0,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Process-wide SQLite-backed memory store.
///
/// Open once per db path and share the handle; `Database::open` and
/// friends apply WAL/synchronous/foreign-key pragmas on first open.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
    embedding_dim: Arc<Mutex<Option<usize>>>,
}

impl MemoryStore {
    /// Open (or create) the store at `path`, applying durability pragmas
    /// and creating the schema if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening memory store");
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedding_dim: Arc::new(Mutex::new(None)),
        })
    }

    /// Open an in-memory store — used by tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedding_dim: Arc::new(Mutex::new(None)),
        })
    }

    fn init(conn: &Connection) -> Result<(), MemoryError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                scope TEXT NOT NULL,
                project_path TEXT,
                importance REAL NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_accessed_at INTEGER,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
                embedding BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(scope, project_path);",
        )?;
        debug!("memory store schema ready");
        Ok(())
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, MemoryError>
    where
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("memory store mutex poisoned");
            f(&conn)
        })
        .await
        .expect("blocking task panicked")
    }

    /// Insert or replace a global-scope record.
    pub async fn put_global(&self, mut record: MemoryRecord) -> Result<MemoryRecord, MemoryError> {
        record.scope = MemoryScope::Global;
        self.put(record).await
    }

    /// Insert or replace a project-scope record.
    pub async fn put_project(
        &self,
        mut record: MemoryRecord,
        project_path: impl Into<String>,
    ) -> Result<MemoryRecord, MemoryError> {
        record.scope = MemoryScope::Project(project_path.into());
        self.put(record).await
    }

    /// Insert or replace a record in whatever scope it already carries.
    /// Validates the §3 invariant that global records forbid a project
    /// path and project records require one.
    pub async fn put(&self, mut record: MemoryRecord) -> Result<MemoryRecord, MemoryError> {
        match &record.scope {
            MemoryScope::Global => {}
            MemoryScope::Project(path) if path.is_empty() => {
                return Err(MemoryError::MissingProjectPath);
            }
            MemoryScope::Project(_) => {}
        }
        record.updated_at = Utc::now().timestamp();
        let metadata = serde_json::to_string(&record.metadata)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO memories (id, category, scope, project_path, importance, access_count, created_at, updated_at, last_accessed_at, content, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    scope = excluded.scope,
                    project_path = excluded.project_path,
                    importance = excluded.importance,
                    updated_at = excluded.updated_at,
                    content = excluded.content,
                    metadata = excluded.metadata",
                params![
                    record.id,
                    record.category,
                    record.scope.tag(),
                    record.scope.project_path(),
                    record.importance,
                    record.access_count,
                    record.created_at,
                    record.updated_at,
                    record.last_accessed_at,
                    record.content,
                    metadata,
                ],
            )?;
            Ok(record)
        })
        .await
    }

    /// Fetch a record by id. `scope` is accepted for API symmetry with the
    /// other scoped accessors but a record's id is globally unique in the
    /// schema, so whichever scope most recently wrote the row is returned
    /// regardless of which scope the caller names.
    pub async fn get(&self, id: &str, _scope: &MemoryScope) -> Result<Option<MemoryRecord>, MemoryError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, category, scope, project_path, importance, access_count, created_at, updated_at, last_accessed_at, content, metadata FROM memories WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?
            .transpose()
        })
        .await
    }

    /// Delete a record by id. Cascades to its embedding via the foreign
    /// key `ON DELETE CASCADE`.
    pub async fn delete(&self, id: &str, scope: &MemoryScope) -> Result<(), MemoryError> {
        let id = id.to_string();
        let scope = scope.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM memories WHERE id = ?1 AND scope = ?2 AND project_path IS ?3",
                params![id, scope.tag(), scope.project_path()],
            )?;
            Ok(())
        })
        .await
    }

    /// List every record in `scope` (optionally restricted to a project
    /// path when `scope` is `Project`).
    pub async fn list(&self, scope: &MemoryScope) -> Result<Vec<MemoryRecord>, MemoryError> {
        let scope = scope.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category, scope, project_path, importance, access_count, created_at, updated_at, last_accessed_at, content, metadata
                 FROM memories WHERE scope = ?1 AND project_path IS ?2",
            )?;
            let rows = stmt
                .query_map(params![scope.tag(), scope.project_path()], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(|r| r.map_err(MemoryError::from)).collect()
        })
        .await
    }

    /// Count records in `scope`.
    pub async fn count(&self, scope: &MemoryScope) -> Result<u64, MemoryError> {
        let scope = scope.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE scope = ?1 AND project_path IS ?2",
                params![scope.tag(), scope.project_path()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Record an access: increments `access_count` and stamps
    /// `last_accessed_at`, used by `cleanup`'s retention rule and recall
    /// ranking.
    pub async fn touch(&self, id: &str, scope: &MemoryScope) -> Result<(), MemoryError> {
        let id = id.to_string();
        let scope = scope.clone();
        let now = Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?4
                 WHERE id = ?1 AND scope = ?2 AND project_path IS ?3",
                params![id, scope.tag(), scope.project_path(), now],
            )?;
            Ok(())
        })
        .await
    }

    /// Configure (or lazily adopt) the embedding dimension enforced by
    /// `write_embedding`. A mismatch against an already-configured
    /// dimension is fatal (§13 Open Question 5) — no migration is
    /// attempted, the write is rejected.
    fn check_dimension(&self, len: usize) -> Result<(), MemoryError> {
        let mut dim = self.embedding_dim.lock().expect("embedding dim mutex poisoned");
        match *dim {
            Some(expected) if expected != len => {
                warn!(expected, actual = len, "embedding dimension mismatch, rejecting write");
                Err(MemoryError::DimensionMismatch { expected, actual: len })
            }
            Some(_) => Ok(()),
            None => {
                *dim = Some(len);
                Ok(())
            }
        }
    }

    /// Insert or replace a record together with its embedding in a single
    /// SQLite transaction, so the two writes `put`/`write_embedding` would
    /// otherwise perform separately are crash-atomic relative to each
    /// other per §4.D. Callers that already have a computed embedding
    /// (the common case: embed, then persist) should prefer this over
    /// calling `put` and `write_embedding` back to back.
    pub async fn put_with_embedding(
        &self,
        mut record: MemoryRecord,
        vector: Vec<f32>,
    ) -> Result<MemoryRecord, MemoryError> {
        match &record.scope {
            MemoryScope::Global => {}
            MemoryScope::Project(path) if path.is_empty() => {
                return Err(MemoryError::MissingProjectPath);
            }
            MemoryScope::Project(_) => {}
        }
        self.check_dimension(vector.len())?;
        record.updated_at = Utc::now().timestamp();
        let metadata = serde_json::to_string(&record.metadata)?;
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO memories (id, category, scope, project_path, importance, access_count, created_at, updated_at, last_accessed_at, content, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    scope = excluded.scope,
                    project_path = excluded.project_path,
                    importance = excluded.importance,
                    updated_at = excluded.updated_at,
                    content = excluded.content,
                    metadata = excluded.metadata",
                params![
                    record.id,
                    record.category,
                    record.scope.tag(),
                    record.scope.project_path(),
                    record.importance,
                    record.access_count,
                    record.created_at,
                    record.updated_at,
                    record.last_accessed_at,
                    record.content,
                    metadata,
                ],
            )?;
            let bytes = encode_vector(&vector);
            tx.execute(
                "INSERT INTO objects (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                params![record.id, bytes],
            )?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    /// Write an embedding vector for `id`. Transactional relative to the
    /// record's own existence: fails if the record row is missing, since
    /// `objects.id` is a foreign key into `memories.id`. The first write
    /// fixes the store's embedding dimension; later writes of a
    /// mismatched length are rejected fatally.
    pub async fn write_embedding(&self, id: &str, vector: Vec<f32>) -> Result<(), MemoryError> {
        self.check_dimension(vector.len())?;
        let id = id.to_string();
        self.with_conn(move |conn| {
            let bytes = encode_vector(&vector);
            conn.execute(
                "INSERT INTO objects (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                params![id, bytes],
            )?;
            Ok(())
        })
        .await
    }

    /// Read an embedding vector for `id`, if one has been written.
    pub async fn read_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, MemoryError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row("SELECT embedding FROM objects WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            Ok(bytes.map(|b| decode_vector(&b)))
        })
        .await
    }

    /// List `(id, embedding)` pairs for every record in `scope` that has
    /// a stored embedding.
    pub async fn list_embeddings(&self, scope: &MemoryScope) -> Result<Vec<(String, Vec<f32>, i64)>, MemoryError> {
        let scope = scope.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, o.embedding, m.created_at FROM memories m
                 JOIN objects o ON o.id = m.id
                 WHERE m.scope = ?1 AND m.project_path IS ?2",
            )?;
            let rows = stmt
                .query_map(params![scope.tag(), scope.project_path()], |row| {
                    let id: String = row.get(0)?;
                    let bytes: Vec<u8> = row.get(1)?;
                    let created_at: i64 = row.get(2)?;
                    Ok((id, bytes, created_at))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .map(|(id, b, created_at)| (id, decode_vector(&b), created_at))
                .collect())
        })
        .await
    }

    /// Retention sweep (§4.D): deletes records where
    /// `importance < min_importance ∧ age > max_age_days ∧ access_count < 3`.
    /// Returns the number of records deleted.
    pub async fn cleanup(&self, min_importance: f64, max_age_days: i64) -> Result<u64, MemoryError> {
        let cutoff = Utc::now().timestamp() - max_age_days * 86_400;
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memories WHERE importance < ?1 AND created_at < ?2 AND access_count < 3",
                params![min_importance, cutoff],
            )?;
            Ok(deleted as u64)
        })
        .await
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<MemoryRecord, MemoryError>> {
    let scope_tag: String = row.get(2)?;
    let project_path: Option<String> = row.get(3)?;
    let scope = match scope_tag.as_str() {
        "project" => MemoryScope::Project(project_path.unwrap_or_default()),
        _ => MemoryScope::Global,
    };
    let metadata_json: String = row.get(10)?;
    let metadata = match serde_json::from_str(&metadata_json) {
        Ok(m) => m,
        Err(e) => return Ok(Err(MemoryError::from(e))),
    };
    Ok(Ok(MemoryRecord {
        id: row.get(0)?,
        category: row.get(1)?,
        scope,
        importance: row.get(4)?,
        access_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_accessed_at: row.get(8)?,
        content: row.get(9)?,
        metadata,
    }))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, importance: f64, created_at: i64, access_count: i64) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            category: "fact".into(),
            scope: MemoryScope::Global,
            importance,
            access_count,
            created_at,
            updated_at: created_at,
            last_accessed_at: None,
            content: "some remembered fact".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn put_and_get_global_roundtrip() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 0, 0)).await.unwrap();
        let fetched = store.get("m1", &MemoryScope::Global).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().content, "some remembered fact");
    }

    #[tokio::test]
    async fn project_scope_is_isolated_from_global() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("shared-id", 0.5, 0, 0)).await.unwrap();
        store
            .put_project(record("shared-id", 0.9, 0, 0), "/repo/a")
            .await
            .unwrap();

        let global = store.get("shared-id", &MemoryScope::Global).await.unwrap().unwrap();
        let project = store
            .get("shared-id", &MemoryScope::Project("/repo/a".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(global.importance, 0.9); // same row id, project write wins (upsert)
        assert_eq!(project.importance, 0.9);
    }

    #[tokio::test]
    async fn project_scope_requires_nonempty_path() {
        let store = MemoryStore::open_in_memory().unwrap();
        let err = store.put_project(record("p1", 0.5, 0, 0), "").await.unwrap_err();
        assert!(matches!(err, MemoryError::MissingProjectPath));
    }

    #[tokio::test]
    async fn put_bumps_updated_at_but_preserves_created_at() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 1_000, 0)).await.unwrap();
        let mut second = record("m1", 0.9, 1_000, 0);
        second.created_at = 9_999; // attempt to smuggle a different created_at
        store.put_global(second).await.unwrap();

        let fetched = store.get("m1", &MemoryScope::Global).await.unwrap().unwrap();
        assert_eq!(fetched.created_at, 1_000);
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn delete_cascades_embedding() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 0, 0)).await.unwrap();
        store.write_embedding("m1", vec![1.0, 2.0, 3.0]).await.unwrap();
        store.delete("m1", &MemoryScope::Global).await.unwrap();
        let embedding = store.read_embedding("m1").await.unwrap();
        assert!(embedding.is_none());
    }

    #[tokio::test]
    async fn embedding_roundtrips_exactly() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 0, 0)).await.unwrap();
        let vector = vec![0.1_f32, -0.2, 3.14159];
        store.write_embedding("m1", vector.clone()).await.unwrap();
        let fetched = store.read_embedding("m1").await.unwrap().unwrap();
        assert_eq!(fetched, vector);
    }

    #[tokio::test]
    async fn embedding_dimension_mismatch_is_fatal() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 0, 0)).await.unwrap();
        store.put_global(record("m2", 0.5, 0, 0)).await.unwrap();
        store.write_embedding("m1", vec![1.0, 2.0, 3.0]).await.unwrap();
        let err = store.write_embedding("m2", vec![1.0, 2.0]).await.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }

    #[tokio::test]
    async fn cleanup_deletes_only_conjunction_matches() {
        let store = MemoryStore::open_in_memory().unwrap();
        let old = Utc::now().timestamp() - 100 * 86_400;
        // Low importance, old, rarely accessed -> deleted.
        store.put_global(record("stale", 0.1, old, 0)).await.unwrap();
        // Low importance and old, but accessed often -> survives.
        store.put_global(record("well-used", 0.1, old, 10)).await.unwrap();
        // High importance, old, rarely accessed -> survives.
        store.put_global(record("important", 0.9, old, 0)).await.unwrap();

        let deleted = store.cleanup(0.5, 30).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get("stale", &MemoryScope::Global).await.unwrap().is_none());
        assert!(store.get("well-used", &MemoryScope::Global).await.unwrap().is_some());
        assert!(store.get("important", &MemoryScope::Global).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn touch_increments_access_count_and_stamps_last_accessed() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("m1", 0.5, 0, 0)).await.unwrap();
        store.touch("m1", &MemoryScope::Global).await.unwrap();
        store.touch("m1", &MemoryScope::Global).await.unwrap();
        let fetched = store.get("m1", &MemoryScope::Global).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
        assert!(fetched.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn list_and_count_scoped_to_project() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_project(record("p1", 0.5, 0, 0), "/repo/a").await.unwrap();
        store.put_project(record("p2", 0.5, 0, 0), "/repo/a").await.unwrap();
        store.put_project(record("p3", 0.5, 0, 0), "/repo/b").await.unwrap();

        let scope = MemoryScope::Project("/repo/a".into());
        assert_eq!(store.count(&scope).await.unwrap(), 2);
        assert_eq!(store.list(&scope).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_embeddings_only_returns_records_with_embeddings() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.put_global(record("with-embedding", 0.5, 0, 0)).await.unwrap();
        store.put_global(record("without-embedding", 0.5, 0, 0)).await.unwrap();
        store.write_embedding("with-embedding", vec![1.0]).await.unwrap();

        let embeddings = store.list_embeddings(&MemoryScope::Global).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].0, "with-embedding");
        assert_eq!(embeddings[0].2, 0);
    }

    #[tokio::test]
    async fn metadata_roundtrips() {
        let store = MemoryStore::open_in_memory().unwrap();
        let mut rec = record("m1", 0.5, 0, 0);
        rec.metadata.insert("source".into(), Value::String("chat".into()));
        store.put_global(rec).await.unwrap();
        let fetched = store.get("m1", &MemoryScope::Global).await.unwrap().unwrap();
        assert_eq!(fetched.metadata.get("source"), Some(&Value::String("chat".into())));
    }
}
