//! Walk → chunk → batch → store.

use std::collections::HashSet;
use std::path::Path;

use repolens_core::{IngestConfig, LensError, Metadata};
use repolens_walk::{read_source, walk_tree, SourceEntry};
use serde::{Deserialize, Serialize};

use crate::chunker::Chunker;
use crate::identity::chunk_id;
use crate::store::VectorStore;

/// Outcome of one ingestion pass.
///
/// # Examples
///
/// ```
/// use repolens_index::IngestReport;
///
/// let report = IngestReport::default();
/// assert_eq!(report.total, 0);
/// assert!(report.paths.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Chunks in the collection after the pass.
    pub total: usize,
    /// Relative paths that contributed at least one chunk, in walk order.
    pub paths: Vec<String>,
    /// Files returned by the walk.
    pub files_seen: usize,
    /// Files skipped because they were unreadable or empty.
    pub files_skipped: usize,
    /// Chunks written during this pass, overwrites included.
    pub chunks_written: usize,
    /// Slots that did not exist before this pass.
    pub added: usize,
    /// Number of batch flushes.
    pub batches: usize,
    /// Stale slots removed from files whose chunk count shrank.
    pub pruned: usize,
}

/// Per-file progress notification.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// File about to be chunked.
    pub path: &'a str,
    /// 1-based position in the walk.
    pub position: usize,
    /// Files in the walk.
    pub total: usize,
}

/// Ingest every doc and code file under `root` into `store`.
///
/// # Errors
///
/// See [`ingest_tree_with_progress`].
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use repolens_core::LensConfig;
/// use repolens_index::{ingest_tree, VectorStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = LensConfig::load(None).unwrap();
/// let store = VectorStore::from_config(&config).unwrap();
/// let report = ingest_tree(Path::new("."), &config.ingest, &store).await.unwrap();
/// println!("{} chunks from {} files", report.total, report.paths.len());
/// # }
/// ```
pub async fn ingest_tree(
    root: &Path,
    config: &IngestConfig,
    store: &VectorStore,
) -> Result<IngestReport, LensError> {
    ingest_tree_with_progress(root, config, store, |_| {}).await
}

/// Ingest `root` into `store`, calling `on_file` before each file is chunked.
///
/// Files are walked and classified, read, chunked with the strategy for
/// their kind, and assigned slot ids `chunk_id(path, ordinal)`. Chunks are
/// flushed to the store whenever `config.batch_size` accumulate, then once
/// more for the remainder. Unreadable files are logged and skipped. After
/// every flush succeeded, slots beyond a file's current chunk count are
/// pruned.
///
/// # Errors
///
/// Returns [`LensError::Io`] if `root` cannot be walked,
/// [`LensError::Config`] for invalid chunking parameters, and
/// [`LensError::Batch`] wrapping the cause when a flush fails. Batches
/// flushed before the failure stay in the store.
pub async fn ingest_tree_with_progress<F>(
    root: &Path,
    config: &IngestConfig,
    store: &VectorStore,
    mut on_file: F,
) -> Result<IngestReport, LensError>
where
    F: FnMut(Progress<'_>),
{
    let chunker = Chunker::from_config(config)?;
    let files = walk_tree(root, config)?;
    let before = store.count()?;
    let mut report = IngestReport {
        files_seen: files.len(),
        ..IngestReport::default()
    };
    tracing::info!(root = %root.display(), files = files.len(), "starting ingestion");

    let mut batch = Batch::with_capacity(config.batch_size);
    let mut contributed: Vec<(String, usize)> = Vec::new();

    for (i, entry) in files.iter().enumerate() {
        on_file(Progress {
            path: &entry.relative,
            position: i + 1,
            total: files.len(),
        });

        let Some(chunks) = chunk_entry(&chunker, entry) else {
            report.files_skipped += 1;
            continue;
        };

        let metadata = entry.metadata().to_metadata();
        for (ordinal, text) in chunks.iter().enumerate() {
            batch.push(chunk_id(&entry.relative, ordinal), text.clone(), metadata.clone());
            if batch.len() >= config.batch_size {
                flush(store, &mut batch, &mut report).await?;
            }
        }
        contributed.push((entry.relative.clone(), chunks.len()));
    }

    if !batch.is_empty() {
        flush(store, &mut batch, &mut report).await?;
    }

    for (path, count) in &contributed {
        let keep: HashSet<String> = (0..*count).map(|i| chunk_id(path, i)).collect();
        let removed = store.retain_path(path, &keep)?;
        if removed > 0 {
            tracing::warn!(path = %path, removed, "pruned stale chunk slots");
            report.pruned += removed;
        }
    }

    report.paths = contributed.into_iter().map(|(path, _)| path).collect();
    report.total = store.count()?;
    report.added = (report.total + report.pruned).saturating_sub(before);
    tracing::info!(
        files = report.paths.len(),
        skipped = report.files_skipped,
        chunks = report.chunks_written,
        added = report.added,
        total = report.total,
        "ingestion complete"
    );
    Ok(report)
}

/// Read and chunk one file; `None` means skip it.
fn chunk_entry(chunker: &Chunker, entry: &SourceEntry) -> Option<Vec<String>> {
    let text = match read_source(entry) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable file");
            return None;
        }
    };
    if text.trim().is_empty() {
        tracing::debug!(path = %entry.relative, "skipping empty file");
        return None;
    }

    let chunks = chunker.chunk(&text, entry.kind, &entry.lang);
    tracing::debug!(path = %entry.relative, kind = %entry.kind, chunks = chunks.len(), "chunked");
    Some(chunks)
}

async fn flush(
    store: &VectorStore,
    batch: &mut Batch,
    report: &mut IngestReport,
) -> Result<(), LensError> {
    report.batches += 1;
    let number = report.batches;
    store
        .add(&batch.ids, &batch.texts, &batch.metadatas)
        .await
        .map_err(|e| LensError::Batch {
            batch: number,
            source: Box::new(e),
        })?;
    tracing::debug!(batch = number, chunks = batch.len(), "flushed batch");
    report.chunks_written += batch.len();
    batch.clear();
    Ok(())
}

#[derive(Default)]
struct Batch {
    ids: Vec<String>,
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            texts: Vec::with_capacity(capacity),
            metadatas: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, id: String, text: String, metadata: Metadata) {
        self.ids.push(id);
        self.texts.push(text);
        self.metadatas.push(metadata);
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.texts.clear();
        self.metadatas.clear();
    }
}
