use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LensError;
use crate::types::FileKind;

/// Embedding providers understood by `repolens-index`.
const EMBEDDING_PROVIDERS: &[&str] = &["openai", "voyage", "ollama", "hash"];

/// Chat providers understood by `repolens-answer`.
const LLM_PROVIDERS: &[&str] = &["openai", "ollama"];

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".repolens.toml";

/// Top-level configuration loaded from `.repolens.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use repolens_core::LensConfig;
///
/// let config = LensConfig::default();
/// assert_eq!(config.ingest.max_chars, 1200);
/// assert_eq!(config.retrieval.k, 5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LensConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Where the similarity index lives.
    #[serde(default)]
    pub index: IndexConfig,
    /// Tree walking and chunking settings.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Answer generation settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Query-time settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl LensConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Io`] if the file cannot be read, or
    /// [`LensError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, LensError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Extension lists are normalized to lowercase without a leading dot.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use repolens_core::LensConfig;
    ///
    /// let toml = r#"
    /// [ingest]
    /// max_chars = 800
    /// doc_extensions = [".MD"]
    /// "#;
    /// let config = LensConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.ingest.max_chars, 800);
    /// assert_eq!(config.ingest.doc_extensions, vec!["md"]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, LensError> {
        let mut config: Self = toml::from_str(content)?;
        config.ingest.normalize();
        Ok(config)
    }

    /// Resolve configuration the way the CLI does.
    ///
    /// Reads `path` when given, otherwise `.repolens.toml` in the working
    /// directory if it exists, otherwise defaults. Environment overrides are
    /// applied on top and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`LensError`] if the file cannot be read or parsed, or if the
    /// merged configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, LensError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `REPOLENS_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (environment-shaped).
    ///
    /// # Examples
    ///
    /// ```
    /// use repolens_core::LensConfig;
    ///
    /// let mut config = LensConfig::default();
    /// config.apply_overrides(|key| match key {
    ///     "REPOLENS_EMBEDDING_PROVIDER" => Some("hash".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.embedding.provider, "hash");
    /// ```
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("REPOLENS_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Some(path) = lookup("REPOLENS_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Some(collection) = lookup("REPOLENS_COLLECTION") {
            self.index.collection = collection;
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] describing the first violation found.
    pub fn validate(&self) -> Result<(), LensError> {
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(LensError::Config(format!(
                "unknown embedding provider '{}' (expected one of: {})",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if !LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(LensError::Config(format!(
                "unknown llm provider '{}' (expected one of: {})",
                self.llm.provider,
                LLM_PROVIDERS.join(", ")
            )));
        }
        if self.index.collection.trim().is_empty() {
            return Err(LensError::Config("index.collection must not be empty".into()));
        }
        if self.retrieval.k == 0 {
            return Err(LensError::Config("retrieval.k must be at least 1".into()));
        }
        self.ingest.validate()
    }
}

/// Embedding provider configuration.
///
/// # Examples
///
/// ```
/// use repolens_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "openai");
/// assert!(config.model.is_none());
/// assert_eq!(config.dimensions, 384);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: `openai`, `voyage`, `ollama` or `hash`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name; each provider has its own default.
    pub model: Option<String>,
    /// API key; falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Vector width for the offline `hash` provider.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_dimensions() -> usize {
    384
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            api_key: None,
            base_url: None,
            dimensions: default_embedding_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Location of the persistent similarity index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database file (default: `.repolens/index.db`).
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Collection name inside the database (default: `default`).
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".repolens/index.db")
}

fn default_collection() -> String {
    "default".into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
        }
    }
}

/// How code files are cut at definition boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Regex heuristic for keyword- and brace-style definitions.
    #[default]
    Regex,
    /// tree-sitter top-level definitions, regex for unsupported languages.
    Syntax,
}

/// Tree walking and chunking configuration.
///
/// # Examples
///
/// ```
/// use repolens_core::{FileKind, IngestConfig};
///
/// let config = IngestConfig::default();
/// assert_eq!(config.kind_for_extension("MD"), FileKind::Doc);
/// assert_eq!(config.kind_for_extension("py"), FileKind::Code);
/// assert_eq!(config.kind_for_extension("png"), FileKind::Ignored);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum characters per chunk (default: 1200).
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Characters shared by consecutive windows (default: 200).
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Maximum chunks per write to the index (default: 256).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Extensions chunked as prose.
    #[serde(default = "default_doc_extensions")]
    pub doc_extensions: Vec<String>,
    /// Extensions chunked as code.
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,
    /// Directory names never descended into (hidden directories are always skipped).
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
    /// Honor `.gitignore` files under the root (default: false).
    #[serde(default)]
    pub respect_gitignore: bool,
    /// Files larger than this many bytes are skipped (default: 1 MiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Code boundary detection strategy (default: regex).
    #[serde(default)]
    pub code_boundaries: BoundaryMode,
}

fn default_max_chars() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

fn default_batch_size() -> usize {
    256
}

fn default_doc_extensions() -> Vec<String> {
    ["md", "rst", "txt"].iter().map(|s| s.to_string()).collect()
}

fn default_code_extensions() -> Vec<String> {
    [
        "py", "js", "ts", "tsx", "jsx", "java", "kt", "go", "rb", "rs", "cpp", "hpp", "c", "h",
        "php", "cs", "scala", "swift", "m", "mm", "sh", "yaml", "yml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        ".github",
        ".venv",
        "node_modules",
        "dist",
        "build",
        ".next",
        ".cache",
        "__pycache__",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> u64 {
    1_048_576
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
            batch_size: default_batch_size(),
            doc_extensions: default_doc_extensions(),
            code_extensions: default_code_extensions(),
            ignore_dirs: default_ignore_dirs(),
            respect_gitignore: false,
            max_file_size: default_max_file_size(),
            code_boundaries: BoundaryMode::default(),
        }
    }
}

impl IngestConfig {
    /// Classify a file extension (with or without the dot, any case).
    pub fn kind_for_extension(&self, ext: &str) -> FileKind {
        let ext = normalize_extension(ext);
        if self.doc_extensions.iter().any(|e| normalize_extension(e) == ext) {
            FileKind::Doc
        } else if self.code_extensions.iter().any(|e| normalize_extension(e) == ext) {
            FileKind::Code
        } else {
            FileKind::Ignored
        }
    }

    /// Check chunking parameters and extension sets.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] on the first violation.
    pub fn validate(&self) -> Result<(), LensError> {
        if self.max_chars == 0 {
            return Err(LensError::Config("ingest.max_chars must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(LensError::Config("ingest.batch_size must be at least 1".into()));
        }
        let docs: HashSet<String> = self
            .doc_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();
        let mut shared: Vec<String> = self
            .code_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| docs.contains(e))
            .collect();
        if !shared.is_empty() {
            shared.sort();
            shared.dedup();
            return Err(LensError::Config(format!(
                "extensions listed as both doc and code: {}",
                shared.join(", ")
            )));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        for ext in self
            .doc_extensions
            .iter_mut()
            .chain(self.code_extensions.iter_mut())
        {
            *ext = normalize_extension(ext);
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Chat model configuration for answer generation.
///
/// # Examples
///
/// ```
/// use repolens_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o-mini");
/// assert_eq!(config.temperature, 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: `openai` or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// API key; falls back to `OPENAI_API_KEY` for the `openai` provider.
    pub api_key: Option<String>,
    /// Custom base URL for the OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "openai".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question (default: 5).
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}
