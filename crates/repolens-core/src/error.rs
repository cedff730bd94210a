use std::path::PathBuf;

/// Errors that can occur across repolens.
///
/// Library crates use this type directly; it is also a `miette::Diagnostic`
/// so the binary reports it with help text attached.
///
/// # Examples
///
/// ```
/// use repolens_core::LensError;
///
/// let err = LensError::BackendUnavailable("OPENAI_API_KEY not set".into());
/// assert!(err.to_string().contains("OPENAI_API_KEY"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LensError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A source file could not be read or decoded.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O or decoding failure.
        #[source]
        source: std::io::Error,
    },

    /// The embedding provider failed or could not be reached.
    #[error("embedding backend unavailable: {0}")]
    #[diagnostic(help(
        "check the [embedding] section of .repolens.toml, or set provider = \"hash\" to run offline"
    ))]
    BackendUnavailable(String),

    /// The similarity index failed.
    #[error("index error: {0}")]
    Index(String),

    /// A batch flush failed during ingestion.
    #[error("ingestion batch {batch} failed: {source}")]
    Batch {
        /// 1-based number of the failing batch.
        batch: usize,
        /// What went wrong while flushing it.
        #[source]
        source: Box<LensError>,
    },

    /// Malformed evaluation input.
    #[error("evaluation input error: {0}")]
    Evaluation(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl LensError {
    /// Whether retrying the same operation later could succeed.
    ///
    /// True for backend outages and failed batch flushes caused by one.
    pub fn is_retryable(&self) -> bool {
        match self {
            LensError::BackendUnavailable(_) => true,
            LensError::Batch { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
