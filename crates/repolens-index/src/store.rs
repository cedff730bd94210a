//! SQLite-backed vector store.
//!
//! Chunks are stored per collection with their text, JSON metadata, and an
//! embedding BLOB (little-endian `f32`). Cosine distance is computed in Rust
//! over the whole collection at query time.

use std::collections::HashSet;
use std::path::Path;

use repolens_core::{LensConfig, LensError, Metadata, QueryResult, RetrievedChunk};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingBackend;

/// Index statistics for one collection.
///
/// # Examples
///
/// ```
/// use repolens_index::IndexStats;
///
/// let stats = IndexStats {
///     collection: "default".into(),
///     total_chunks: 100,
///     total_files: 10,
///     dimensions: Some(384),
///     index_size_bytes: 50000,
/// };
/// assert_eq!(stats.total_chunks, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Collection the numbers describe.
    pub collection: String,
    /// Chunks stored in the collection.
    pub total_chunks: usize,
    /// Distinct source paths in the collection.
    pub total_files: usize,
    /// Vector width recorded at first write, if any.
    pub dimensions: Option<usize>,
    /// Size of the whole database file in bytes.
    pub index_size_bytes: u64,
}

/// Persistent similarity index: embeds on the way in and on the way out.
///
/// All operations are scoped to one named collection. The store is not
/// internally synchronized; callers run one operation at a time.
///
/// # Examples
///
/// ```
/// use repolens_core::EmbeddingConfig;
/// use repolens_index::{EmbeddingBackend, VectorStore};
///
/// let backend = EmbeddingBackend::from_config(&EmbeddingConfig {
///     provider: "hash".into(),
///     ..EmbeddingConfig::default()
/// })
/// .unwrap();
/// let store = VectorStore::in_memory("default", backend).unwrap();
/// assert_eq!(store.count().unwrap(), 0);
/// ```
pub struct VectorStore {
    conn: Connection,
    collection: String,
    backend: EmbeddingBackend,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("collection", &self.collection)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Open or create an index database at `path`.
    ///
    /// Creates the parent directory and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path, collection: &str, backend: EmbeddingBackend) -> Result<Self, LensError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LensError::Index(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LensError::Index(format!("failed to open database: {e}")))?;
        Self::with_connection(conn, collection, backend)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] if schema creation fails.
    pub fn in_memory(collection: &str, backend: EmbeddingBackend) -> Result<Self, LensError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LensError::Index(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn, collection, backend)
    }

    /// Open the index and embedding backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError`] if the backend cannot be built or the index
    /// cannot be opened.
    pub fn from_config(config: &LensConfig) -> Result<Self, LensError> {
        let backend = EmbeddingBackend::from_config(&config.embedding)?;
        Self::open(&config.index.path, &config.index.collection, backend)
    }

    fn with_connection(
        conn: Connection,
        collection: &str,
        backend: EmbeddingBackend,
    ) -> Result<Self, LensError> {
        let store = Self {
            conn,
            collection: collection.to_string(),
            backend,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), LensError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chunks (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    path TEXT NOT NULL,
                    text TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    PRIMARY KEY (collection, id)
                );

                CREATE INDEX IF NOT EXISTS chunks_by_path ON chunks (collection, path);
                ",
            )
            .map_err(|e| LensError::Index(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// Collection this store reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The embedding backend in use.
    pub fn backend(&self) -> &EmbeddingBackend {
        &self.backend
    }

    /// Embed `texts` and upsert them under `ids` with `metadatas`.
    ///
    /// All-or-nothing: embedding happens before any write, and all rows of
    /// one call are written in a single transaction. An existing id is
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::BackendUnavailable`] if embedding fails, and
    /// [`LensError::Index`] if the sequences differ in length, the vector
    /// width conflicts with the collection, or the write fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use repolens_core::{EmbeddingConfig, Metadata};
    /// use repolens_index::{EmbeddingBackend, VectorStore};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let backend = EmbeddingBackend::from_config(&EmbeddingConfig {
    ///     provider: "hash".into(),
    ///     ..EmbeddingConfig::default()
    /// })
    /// .unwrap();
    /// let store = VectorStore::in_memory("default", backend).unwrap();
    ///
    /// let mut meta = Metadata::new();
    /// meta.insert("path".into(), "a.md".into());
    /// store
    ///     .add(&["id1".to_string()], &["hello world".to_string()], &[meta])
    ///     .await
    ///     .unwrap();
    ///
    /// let result = store.query("hello world", 1).await.unwrap();
    /// assert_eq!(result.hits[0].path(), "a.md");
    /// # }
    /// ```
    pub async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), LensError> {
        if ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(LensError::Index(format!(
                "add needs equal-length inputs: {} ids, {} texts, {} metadatas",
                ids.len(),
                texts.len(),
                metadatas.len()
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let vectors = self.backend.embed(texts).await?;
        let width = vectors.first().map_or(0, Vec::len);
        if vectors.iter().any(|v| v.len() != width) {
            return Err(LensError::Index(
                "embedding backend returned vectors of differing width".into(),
            ));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| LensError::Index(format!("failed to begin transaction: {e}")))?;

        self.ensure_dimensions(width)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (collection, id, path, text, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (collection, id) DO UPDATE SET
                        path = excluded.path,
                        text = excluded.text,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding",
                )
                .map_err(|e| LensError::Index(format!("failed to prepare insert: {e}")))?;

            for (((id, text), metadata), vector) in
                ids.iter().zip(texts).zip(metadatas).zip(&vectors)
            {
                let path = metadata
                    .get("path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let metadata_json = serde_json::to_string(metadata)?;
                stmt.execute(params![
                    self.collection,
                    id,
                    path,
                    text,
                    metadata_json,
                    floats_to_bytes(vector),
                ])
                .map_err(|e| LensError::Index(format!("failed to upsert chunk {id}: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| LensError::Index(format!("failed to commit chunks: {e}")))?;
        tracing::debug!(collection = %self.collection, chunks = ids.len(), "upserted chunks");
        Ok(())
    }

    /// Embed `text` and return the `k` nearest chunks by cosine distance.
    ///
    /// An empty collection, a blank `text` or `k == 0` returns an empty
    /// result without calling the embedding backend.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::BackendUnavailable`] if embedding fails, and
    /// [`LensError::Index`] if the query vector width differs from the
    /// collection's or the read fails.
    pub async fn query(&self, text: &str, k: usize) -> Result<QueryResult, LensError> {
        if k == 0 || text.trim().is_empty() || self.count()? == 0 {
            return Ok(QueryResult::default());
        }

        let query_vector = self.backend.embed_query(text).await?;
        if let Some(stored) = self.dimensions()? {
            if stored != query_vector.len() {
                return Err(dimension_conflict(&self.collection, stored, query_vector.len()));
            }
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, text, metadata, embedding FROM chunks WHERE collection = ?1",
            )
            .map_err(|e| LensError::Index(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![self.collection], |row| {
                let id: String = row.get(0)?;
                let text: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let embedding: Vec<u8> = row.get(3)?;
                Ok((id, text, metadata, embedding))
            })
            .map_err(|e| LensError::Index(format!("failed to query chunks: {e}")))?;

        let mut scored: Vec<(f64, String, RetrievedChunk)> = Vec::new();
        for row in rows {
            let (id, text, metadata, embedding) =
                row.map_err(|e| LensError::Index(format!("failed to read row: {e}")))?;
            let metadata: Metadata = serde_json::from_str(&metadata).map_err(|e| {
                LensError::Index(format!("corrupted metadata for chunk {id}: {e}"))
            })?;
            let distance = 1.0 - cosine_similarity(&query_vector, &bytes_to_floats(&embedding));
            scored.push((
                distance,
                id,
                RetrievedChunk {
                    text,
                    metadata,
                    distance,
                },
            ));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(k);
        Ok(QueryResult::new(
            scored.into_iter().map(|(_, _, hit)| hit).collect(),
        ))
    }

    /// Number of chunks stored in this collection.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] on query failure.
    pub fn count(&self) -> Result<usize, LensError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![self.collection],
                |row| row.get(0),
            )
            .map_err(|e| LensError::Index(format!("failed to count chunks: {e}")))?;
        Ok(count as usize)
    }

    /// Ids stored for `path` in this collection.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] on query failure.
    pub fn ids_for_path(&self, path: &str) -> Result<Vec<String>, LensError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM chunks WHERE collection = ?1 AND path = ?2 ORDER BY id")
            .map_err(|e| LensError::Index(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![self.collection, path], |row| row.get(0))
            .map_err(|e| LensError::Index(format!("failed to query ids: {e}")))?;

        let mut ids = Vec::new();
        for row in rows {
            let id: String =
                row.map_err(|e| LensError::Index(format!("failed to read row: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Delete every chunk of `path` whose id is not in `keep`.
    ///
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] on query or delete failure.
    pub fn retain_path(&self, path: &str, keep: &HashSet<String>) -> Result<usize, LensError> {
        let stale: Vec<String> = self
            .ids_for_path(path)?
            .into_iter()
            .filter(|id| !keep.contains(id))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| LensError::Index(format!("failed to begin transaction: {e}")))?;
        for id in &stale {
            tx.execute(
                "DELETE FROM chunks WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
            )
            .map_err(|e| LensError::Index(format!("failed to delete chunk {id}: {e}")))?;
        }
        tx.commit()
            .map_err(|e| LensError::Index(format!("failed to commit deletes: {e}")))?;
        Ok(stale.len())
    }

    /// Vector width recorded for this collection, if anything was written.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] if the stored value is unreadable.
    pub fn dimensions(&self) -> Result<Option<usize>, LensError> {
        match self.get_metadata(&self.dimensions_key())? {
            Some(v) => v.parse().map(Some).map_err(|_| {
                LensError::Index(format!("corrupted dimension metadata in index: '{v}'"))
            }),
            None => Ok(None),
        }
    }

    /// Statistics for this collection.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Index`] on query failure.
    pub fn stats(&self) -> Result<IndexStats, LensError> {
        let total_files: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(DISTINCT path) FROM chunks WHERE collection = ?1",
                params![self.collection],
                |row| row.get(0),
            )
            .map_err(|e| LensError::Index(format!("failed to count files: {e}")))?;

        // For in-memory databases, page_count returns a small number
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            collection: self.collection.clone(),
            total_chunks: self.count()?,
            total_files: total_files as usize,
            dimensions: self.dimensions()?,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }

    fn dimensions_key(&self) -> String {
        format!("dimensions:{}", self.collection)
    }

    /// Record the vector width on first write; reject a different one later.
    fn ensure_dimensions(&self, width: usize) -> Result<(), LensError> {
        match self.dimensions()? {
            Some(stored) if stored != width => {
                Err(dimension_conflict(&self.collection, stored, width))
            }
            Some(_) => Ok(()),
            None => self.set_metadata(&self.dimensions_key(), &width.to_string()),
        }
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>, LensError> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LensError::Index(format!("failed to get metadata '{key}': {e}")))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), LensError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| LensError::Index(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }
}

fn dimension_conflict(collection: &str, stored: usize, got: usize) -> LensError {
    LensError::Index(format!(
        "collection '{collection}' holds {stored}-dimensional vectors but the embedding \
         backend produced {got}; re-index into a fresh collection or index file"
    ))
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}
