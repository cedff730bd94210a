//! Chunking, embedding, and nearest-neighbor retrieval.
//!
//! Splits docs at headings and code at definition boundaries, assigns
//! slot-addressed chunk ids, embeds chunks with a configurable provider, and
//! stores them in a SQLite index with cosine search computed in Rust. The
//! [`ingest`] module drives a whole tree through that pipeline and [`eval`]
//! scores retrieval with precision@k.

pub mod chunker;
pub mod embedding;
pub mod eval;
pub mod identity;
pub mod ingest;
pub mod store;

pub use chunker::{ChunkParams, Chunker};
pub use embedding::EmbeddingBackend;
pub use eval::{precision_at_k, EvaluationReport, QueryOutcome};
pub use identity::chunk_id;
pub use ingest::{ingest_tree, IngestReport};
pub use store::{IndexStats, VectorStore};
