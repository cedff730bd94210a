//! Retrieval evaluation: precision@k over labeled questions.
//!
//! A question is a hit when any retrieved chunk's path contains, ignoring
//! case, any of its expected keywords.

use std::future::Future;
use std::io;
use std::path::Path;

use repolens_core::{EvaluationQuery, LensError, QueryResult};
use serde::{Deserialize, Serialize};

use crate::store::VectorStore;

/// Per-question evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// The question asked.
    pub question: String,
    /// Paths of the retrieved chunks, in rank order.
    pub retrieved_paths: Vec<String>,
    /// Whether any retrieved path matched an expected keyword.
    pub hit: bool,
}

/// Aggregate precision@k plus per-question details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    /// Fraction of questions that were hits; `0.0` with no questions.
    pub precision: f64,
    /// Number of chunks retrieved per question.
    pub k: usize,
    /// Number of hits.
    pub hits: usize,
    /// One entry per question, in input order.
    pub details: Vec<QueryOutcome>,
}

#[derive(Deserialize)]
struct QueryRow {
    question: String,
    relevant_keywords: String,
}

/// Parse evaluation questions from CSV.
///
/// The header must name `question` and `relevant_keywords` columns; other
/// columns are ignored. Keywords are `|`-separated, trimmed, and empties are
/// dropped. Rows with a blank question are skipped.
///
/// # Errors
///
/// Returns [`LensError::Evaluation`] if the CSV is malformed or a required
/// column is missing.
///
/// # Examples
///
/// ```
/// use repolens_index::eval::parse_queries;
///
/// let csv = "question,relevant_keywords\nWhere is auth?,auth | middleware\n";
/// let queries = parse_queries(csv.as_bytes()).unwrap();
/// assert_eq!(queries[0].relevant_keywords, vec!["auth", "middleware"]);
/// ```
pub fn parse_queries<R: io::Read>(reader: R) -> Result<Vec<EvaluationQuery>, LensError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut queries = Vec::new();
    for (line, row) in csv_reader.deserialize::<QueryRow>().enumerate() {
        let row = row.map_err(|e| {
            LensError::Evaluation(format!("invalid evaluation row {}: {e}", line + 1))
        })?;
        if row.question.is_empty() {
            tracing::debug!(row = line + 1, "skipping row without a question");
            continue;
        }
        queries.push(EvaluationQuery {
            question: row.question,
            relevant_keywords: split_keywords(&row.relevant_keywords),
        });
    }
    Ok(queries)
}

/// Read evaluation questions from a CSV file.
///
/// # Errors
///
/// Returns [`LensError::Read`] if the file cannot be opened, or
/// [`LensError::Evaluation`] if its content is malformed.
pub fn load_queries(path: &Path) -> Result<Vec<EvaluationQuery>, LensError> {
    let file = std::fs::File::open(path).map_err(|source| LensError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_queries(io::BufReader::new(file))
}

/// Split a `|`-separated keyword list.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether any path contains any keyword, ignoring case.
///
/// An empty keyword list never matches.
///
/// # Examples
///
/// ```
/// use repolens_index::eval::is_hit;
///
/// let paths = vec!["src/Auth/middleware.py".to_string()];
/// assert!(is_hit(&paths, &["auth".to_string()]));
/// assert!(!is_hit(&paths, &[]));
/// ```
pub fn is_hit(paths: &[String], keywords: &[String]) -> bool {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    paths.iter().any(|path| {
        let path = path.to_lowercase();
        keywords.iter().any(|k| path.contains(k.as_str()))
    })
}

/// Score `retrieve` with precision@k over `queries`.
///
/// `retrieve` is called once per question, in order, with `(question, k)`.
///
/// # Errors
///
/// Propagates the first error returned by `retrieve`.
///
/// # Examples
///
/// ```
/// use repolens_core::{EvaluationQuery, Metadata, QueryResult, RetrievedChunk};
/// use repolens_index::precision_at_k;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queries = vec![EvaluationQuery {
///     question: "Where is auth?".into(),
///     relevant_keywords: vec!["auth".into()],
/// }];
/// let report = precision_at_k(&queries, 5, |_q, _k| async {
///     let mut metadata = Metadata::new();
///     metadata.insert("path".into(), "src/auth/middleware.py".into());
///     Ok(QueryResult::new(vec![RetrievedChunk { text: String::new(), metadata, distance: 0.1 }]))
/// })
/// .await
/// .unwrap();
/// assert_eq!(report.precision, 1.0);
/// # }
/// ```
pub async fn precision_at_k<F, Fut>(
    queries: &[EvaluationQuery],
    k: usize,
    mut retrieve: F,
) -> Result<EvaluationReport, LensError>
where
    F: FnMut(String, usize) -> Fut,
    Fut: Future<Output = Result<QueryResult, LensError>>,
{
    let mut details = Vec::with_capacity(queries.len());
    for query in queries {
        let result = retrieve(query.question.clone(), k).await?;
        let retrieved_paths = result.paths();
        let hit = is_hit(&retrieved_paths, &query.relevant_keywords);
        tracing::debug!(question = %query.question, hit, "evaluated question");
        details.push(QueryOutcome {
            question: query.question.clone(),
            retrieved_paths,
            hit,
        });
    }

    let hits = details.iter().filter(|d| d.hit).count();
    let precision = if details.is_empty() {
        0.0
    } else {
        hits as f64 / details.len() as f64
    };
    Ok(EvaluationReport {
        precision,
        k,
        hits,
        details,
    })
}

/// Score a store's own retrieval with precision@k.
///
/// # Errors
///
/// Propagates the first query error.
pub async fn evaluate_store(
    store: &VectorStore,
    queries: &[EvaluationQuery],
    k: usize,
) -> Result<EvaluationReport, LensError> {
    precision_at_k(queries, k, |question, k| async move {
        store.query(&question, k).await
    })
    .await
}
