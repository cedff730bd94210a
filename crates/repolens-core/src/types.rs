use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata stored next to every indexed chunk.
pub type Metadata = serde_json::Map<String, Value>;

/// Classification of a source file by extension.
///
/// # Examples
///
/// ```
/// use repolens_core::FileKind;
///
/// assert_eq!(FileKind::Doc.to_string(), "doc");
/// assert_eq!(serde_json::to_string(&FileKind::Code).unwrap(), "\"code\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Prose documentation, split at headings.
    Doc,
    /// Source code, split at definitions.
    Code,
    /// Neither; never read.
    Ignored,
}

impl FileKind {
    /// Lowercase name as stored in chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Doc => "doc",
            FileKind::Code => "code",
            FileKind::Ignored => "ignored",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{path, type, lang}` metadata attached to each ingested chunk.
///
/// # Examples
///
/// ```
/// use repolens_core::{ChunkMetadata, FileKind};
///
/// let meta = ChunkMetadata {
///     path: "src/auth.py".into(),
///     kind: FileKind::Code,
///     lang: "py".into(),
/// };
/// let map = meta.to_metadata();
/// assert_eq!(map["type"], "code");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path relative to the ingested root, `/`-separated.
    pub path: String,
    /// Whether the chunk came from a doc or a code file.
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Lowercased file extension, empty when the file has none.
    pub lang: String,
}

impl ChunkMetadata {
    /// Convert into the generic map stored by the index.
    pub fn to_metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("path".into(), Value::String(self.path.clone()));
        map.insert("type".into(), Value::String(self.kind.as_str().into()));
        map.insert("lang".into(), Value::String(self.lang.clone()));
        map
    }
}

/// One nearest-neighbor hit: chunk text, its metadata, and cosine distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Stored chunk text.
    pub text: String,
    /// Metadata stored with the chunk.
    pub metadata: Metadata,
    /// Cosine distance to the query (0 = identical direction).
    pub distance: f64,
}

impl RetrievedChunk {
    /// The `path` metadata entry, or `""` when absent.
    pub fn path(&self) -> &str {
        metadata_str(&self.metadata, "path")
    }

    /// The `lang` metadata entry, or `""` when absent.
    pub fn lang(&self) -> &str {
        metadata_str(&self.metadata, "lang")
    }
}

fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> &'a str {
    metadata.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Hits of a k-NN query, ordered by ascending distance.
///
/// # Examples
///
/// ```
/// use repolens_core::QueryResult;
///
/// let result = QueryResult::default();
/// assert!(result.is_empty());
/// assert!(result.paths().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Hits, closest first.
    pub hits: Vec<RetrievedChunk>,
}

impl QueryResult {
    /// Wrap hits that are already sorted by ascending distance.
    pub fn new(hits: Vec<RetrievedChunk>) -> Self {
        Self { hits }
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether the query found nothing.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Iterate over hits, closest first.
    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedChunk> {
        self.hits.iter()
    }

    /// Source paths of the hits, in rank order.
    pub fn paths(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.path().to_string()).collect()
    }

    /// Convert into ranked contexts for answer generation.
    pub fn into_ranked(self) -> Vec<RankedContext> {
        self.hits.into_iter().map(RankedContext::from).collect()
    }
}

impl IntoIterator for QueryResult {
    type Item = RetrievedChunk;
    type IntoIter = std::vec::IntoIter<RetrievedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

/// A retrieved chunk handed to the answer generator, scored `1 - distance`.
///
/// # Examples
///
/// ```
/// use repolens_core::{Metadata, RankedContext, RetrievedChunk};
///
/// let hit = RetrievedChunk {
///     text: "fn main() {}".into(),
///     metadata: Metadata::new(),
///     distance: 0.25,
/// };
/// let ctx = RankedContext::from(hit);
/// assert!((ctx.score - 0.75).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedContext {
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: Metadata,
    /// Similarity score, `1 - distance`.
    pub score: f64,
}

impl RankedContext {
    /// The `path` metadata entry, or `""` when absent.
    pub fn path(&self) -> &str {
        metadata_str(&self.metadata, "path")
    }

    /// The `lang` metadata entry, or `""` when absent.
    pub fn lang(&self) -> &str {
        metadata_str(&self.metadata, "lang")
    }
}

impl From<RetrievedChunk> for RankedContext {
    fn from(hit: RetrievedChunk) -> Self {
        Self {
            text: hit.text,
            metadata: hit.metadata,
            score: 1.0 - hit.distance,
        }
    }
}

/// A labeled question used to score retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationQuery {
    /// Natural-language question.
    pub question: String,
    /// Case-insensitive substrings expected in a retrieved path.
    pub relevant_keywords: Vec<String>,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use repolens_core::OutputFormat;
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, distance: f64) -> RetrievedChunk {
        let meta = ChunkMetadata {
            path: path.into(),
            kind: FileKind::Doc,
            lang: "md".into(),
        };
        RetrievedChunk {
            text: format!("text of {path}"),
            metadata: meta.to_metadata(),
            distance,
        }
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn chunk_metadata_serializes_type_key() {
        let meta = ChunkMetadata {
            path: "README.md".into(),
            kind: FileKind::Doc,
            lang: "md".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "doc");
        assert!(json.get("kind").is_none());
        assert_eq!(Value::Object(meta.to_metadata()), json);
    }

    #[test]
    fn query_result_paths_keep_rank_order() {
        let result = QueryResult::new(vec![hit("b.md", 0.1), hit("a.md", 0.4)]);
        assert_eq!(result.paths(), vec!["b.md", "a.md"]);
    }

    #[test]
    fn missing_path_reads_as_empty() {
        let hit = RetrievedChunk {
            text: "x".into(),
            metadata: Metadata::new(),
            distance: 0.0,
        };
        assert_eq!(hit.path(), "");
        assert_eq!(hit.lang(), "");
    }

    #[test]
    fn ranked_contexts_score_is_one_minus_distance() {
        let ranked = QueryResult::new(vec![hit("a.md", 0.0), hit("b.md", 0.6)]).into_ranked();
        assert_eq!(ranked[0].score, 1.0);
        assert!((ranked[1].score - 0.4).abs() < 1e-9);
        assert_eq!(ranked[1].path(), "b.md");
        assert_eq!(ranked[1].lang(), "md");
    }
}
