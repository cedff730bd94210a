//! Core types, configuration, and error handling for repolens.
//!
//! This crate provides the shared foundation used by all other repolens crates:
//! - [`LensError`]: unified error type using `thiserror`
//! - [`LensConfig`]: configuration loaded from `.repolens.toml`
//! - Shared types: [`FileKind`], [`ChunkMetadata`], [`RetrievedChunk`],
//!   [`QueryResult`], [`RankedContext`], [`EvaluationQuery`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    BoundaryMode, EmbeddingConfig, IndexConfig, IngestConfig, LensConfig, LlmConfig,
    RetrievalConfig, DEFAULT_CONFIG_FILE,
};
pub use error::LensError;
pub use types::{
    ChunkMetadata, EvaluationQuery, FileKind, Metadata, OutputFormat, QueryResult, RankedContext,
    RetrievedChunk,
};

/// A convenience `Result` type for repolens operations.
pub type Result<T> = std::result::Result<T, LensError>;
