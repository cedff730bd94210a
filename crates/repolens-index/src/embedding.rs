//! Embedding providers behind one "texts in, vectors out" contract.
//!
//! - `openai`: OpenAI `/embeddings` (default `text-embedding-3-small`)
//! - `voyage`: Voyage AI `/embeddings` with `input_type` document/query
//!   (default `voyage-code-3`)
//! - `ollama`: a locally served model over `/api/embed` (default `all-minilm`)
//! - `hash`: offline feature hashing, deterministic, no network
//!
//! Remote providers are called in sub-batches of 64 texts with a 200ms pause
//! between sub-batches. Every failure surfaces as
//! [`LensError::BackendUnavailable`]; a failed call never yields placeholder
//! vectors.

use std::time::Duration;

use repolens_core::{EmbeddingConfig, LensError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SUB_BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "text-embedding-3-small";
const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const VOYAGE_MODEL: &str = "voyage-code-3";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const OLLAMA_MODEL: &str = "all-minilm";

/// A configured embedding provider.
///
/// Built from an explicit [`EmbeddingConfig`]; several backends can coexist
/// in one process. Vector width depends on the provider and model, so
/// callers must not assume it is the same across configurations.
///
/// # Examples
///
/// ```
/// use repolens_core::EmbeddingConfig;
/// use repolens_index::EmbeddingBackend;
///
/// let config = EmbeddingConfig {
///     provider: "hash".into(),
///     dimensions: 64,
///     ..EmbeddingConfig::default()
/// };
/// let backend = EmbeddingBackend::from_config(&config).unwrap();
/// assert_eq!(backend.provider(), "hash");
/// ```
#[derive(Debug)]
pub enum EmbeddingBackend {
    /// OpenAI or Voyage over HTTPS.
    Remote(RemoteEmbedder),
    /// A model served by a local Ollama daemon.
    Ollama(OllamaEmbedder),
    /// Offline feature hashing.
    Hashed(HashEmbedder),
}

impl EmbeddingBackend {
    /// Build the backend named by `config.provider`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::BackendUnavailable`] if a remote provider has no
    /// API key (neither in config nor in its environment variable) or the
    /// HTTP client cannot be built, and [`LensError::Config`] for an unknown
    /// provider or a zero `dimensions` with the `hash` provider.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, LensError> {
        match config.provider.as_str() {
            "openai" => Ok(Self::Remote(RemoteEmbedder::new(RemoteProvider::OpenAi, config)?)),
            "voyage" => Ok(Self::Remote(RemoteEmbedder::new(RemoteProvider::Voyage, config)?)),
            "ollama" => Ok(Self::Ollama(OllamaEmbedder::new(config)?)),
            "hash" => Ok(Self::Hashed(HashEmbedder::new(config.dimensions)?)),
            other => Err(LensError::Config(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }

    /// Provider name as written in configuration.
    pub fn provider(&self) -> &str {
        match self {
            Self::Remote(r) => r.provider.name(),
            Self::Ollama(_) => "ollama",
            Self::Hashed(_) => "hash",
        }
    }

    /// Model name, or `feature-hash-{dims}` for the hash provider.
    pub fn model(&self) -> String {
        match self {
            Self::Remote(r) => r.model.clone(),
            Self::Ollama(o) => o.model.clone(),
            Self::Hashed(h) => format!("feature-hash-{}", h.dimensions),
        }
    }

    /// Embed documents for indexing. Returns one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::BackendUnavailable`] if the provider call fails,
    /// returns a malformed body, or returns the wrong number of vectors.
    ///
    /// # Examples
    ///
    /// ```
    /// use repolens_core::EmbeddingConfig;
    /// use repolens_index::EmbeddingBackend;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let config = EmbeddingConfig { provider: "hash".into(), ..EmbeddingConfig::default() };
    /// let backend = EmbeddingBackend::from_config(&config).unwrap();
    /// let vectors = backend.embed(&["fn main() {}".to_string()]).await.unwrap();
    /// assert_eq!(vectors.len(), 1);
    /// assert_eq!(vectors[0].len(), 384);
    /// # }
    /// ```
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LensError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self {
            Self::Remote(r) => r.embed_inputs(texts, InputType::Document).await?,
            Self::Ollama(o) => o.embed_inputs(texts).await?,
            Self::Hashed(h) => texts.iter().map(|t| h.embed_one(t)).collect(),
        };
        check_vectors(texts.len(), &vectors)?;
        Ok(vectors)
    }

    /// Embed a search query.
    ///
    /// Voyage receives `input_type: "query"`; other providers treat queries
    /// like documents.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::BackendUnavailable`] if the provider call fails.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LensError> {
        let input = [text.to_string()];
        let vectors = match self {
            Self::Remote(r) => r.embed_inputs(&input, InputType::Query).await?,
            Self::Ollama(o) => o.embed_inputs(&input).await?,
            Self::Hashed(h) => vec![h.embed_one(text)],
        };
        check_vectors(1, &vectors)?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| LensError::BackendUnavailable("empty embedding response".into()))
    }
}

fn check_vectors(expected: usize, vectors: &[Vec<f32>]) -> Result<(), LensError> {
    if vectors.len() != expected {
        return Err(LensError::BackendUnavailable(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    if vectors.iter().any(Vec::is_empty) {
        return Err(LensError::BackendUnavailable(
            "provider returned an empty embedding".into(),
        ));
    }
    Ok(())
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LensError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LensError::BackendUnavailable(format!("failed to create HTTP client: {e}")))
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteProvider {
    OpenAi,
    Voyage,
}

impl RemoteProvider {
    fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Voyage => "voyage",
        }
    }

    fn key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Voyage => "VOYAGE_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Voyage => VOYAGE_BASE_URL,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_MODEL,
            Self::Voyage => VOYAGE_MODEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputType {
    Document,
    Query,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for the OpenAI and Voyage `/embeddings` endpoints.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    provider: RemoteProvider,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("provider", &self.provider.name())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RemoteEmbedder {
    fn new(provider: RemoteProvider, config: &EmbeddingConfig) -> Result<Self, LensError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(provider.key_env()).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LensError::BackendUnavailable(format!(
                    "{} API key not found: set embedding.api_key in .repolens.toml or {}",
                    provider.name(),
                    provider.key_env()
                ))
            })?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            provider,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
        })
    }

    fn build_request<'a>(&'a self, input: &'a [String], input_type: InputType) -> EmbedRequest<'a> {
        let input_type = match (self.provider, input_type) {
            (RemoteProvider::Voyage, InputType::Document) => Some("document"),
            (RemoteProvider::Voyage, InputType::Query) => Some("query"),
            (RemoteProvider::OpenAi, _) => None,
        };
        EmbedRequest {
            model: &self.model,
            input,
            input_type,
        }
    }

    async fn embed_inputs(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, LensError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(SUB_BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(BATCH_DELAY_MS)).await;
            }

            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&self.build_request(batch, input_type))
                .send()
                .await
                .map_err(|e| {
                    LensError::BackendUnavailable(format!(
                        "{} request failed: {e}",
                        self.provider.name()
                    ))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = error_body(response).await;
                return Err(LensError::BackendUnavailable(format!(
                    "{} API returned {status}: {body}",
                    self.provider.name()
                )));
            }

            let parsed: EmbedResponse = response.json().await.map_err(|e| {
                LensError::BackendUnavailable(format!("failed to parse embedding response: {e}"))
            })?;
            all_embeddings.extend(ordered_embeddings(parsed, batch.len())?);
        }

        Ok(all_embeddings)
    }
}

fn ordered_embeddings(
    mut response: EmbedResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, LensError> {
    if response.data.len() != expected {
        return Err(LensError::BackendUnavailable(format!(
            "expected {expected} embeddings in response, got {}",
            response.data.len()
        )));
    }
    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a local Ollama daemon's `/api/embed` endpoint.
#[derive(Debug)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    fn new(config: &EmbeddingConfig) -> Result<Self, LensError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_MODEL.to_string()),
        })
    }

    async fn embed_inputs(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LensError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(SUB_BATCH_SIZE) {
            let request = OllamaRequest {
                model: &self.model,
                input: batch,
            };
            let response = self
                .client
                .post(format!("{}/api/embed", self.base_url))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    LensError::BackendUnavailable(format!(
                        "ollama request to {} failed: {e}",
                        self.base_url
                    ))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = error_body(response).await;
                return Err(LensError::BackendUnavailable(format!(
                    "ollama returned {status}: {body}"
                )));
            }

            let parsed: OllamaResponse = response.json().await.map_err(|e| {
                LensError::BackendUnavailable(format!("failed to parse ollama response: {e}"))
            })?;
            if parsed.embeddings.len() != batch.len() {
                return Err(LensError::BackendUnavailable(format!(
                    "expected {} embeddings from ollama, got {}",
                    batch.len(),
                    parsed.embeddings.len()
                )));
            }
            all_embeddings.extend(parsed.embeddings);
        }

        Ok(all_embeddings)
    }
}

/// Offline embedder: hashes lowercase word tokens into signed buckets and
/// L2-normalizes the result.
///
/// Texts sharing words land close together, which is enough for tests and
/// air-gapped smoke runs. It carries no semantics beyond token overlap.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of width `dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self, LensError> {
        if dimensions == 0 {
            return Err(LensError::Config(
                "embedding.dimensions must be at least 1 for the hash provider".into(),
            ));
        }
        Ok(Self { dimensions })
    }

    /// Embed one text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_backend(dimensions: usize) -> EmbeddingBackend {
        EmbeddingBackend::from_config(&EmbeddingConfig {
            provider: "hash".into(),
            dimensions,
            ..EmbeddingConfig::default()
        })
        .unwrap()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn voyage_request_carries_input_type() {
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: Some("test-key".into()),
            ..EmbeddingConfig::default()
        };
        let embedder = RemoteEmbedder::new(RemoteProvider::Voyage, &config).unwrap();
        let texts = vec!["fn main() {}".to_string(), "struct Foo {}".to_string()];

        let json = serde_json::to_value(embedder.build_request(&texts, InputType::Document)).unwrap();
        assert_eq!(json["model"], "voyage-code-3");
        assert_eq!(json["input_type"], "document");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);

        let json = serde_json::to_value(embedder.build_request(&texts[..1], InputType::Query)).unwrap();
        assert_eq!(json["input_type"], "query");
    }

    #[test]
    fn openai_request_omits_input_type() {
        let config = EmbeddingConfig {
            api_key: Some("test-key".into()),
            base_url: Some("https://proxy.internal/v1/".into()),
            ..EmbeddingConfig::default()
        };
        let embedder = RemoteEmbedder::new(RemoteProvider::OpenAi, &config).unwrap();
        assert_eq!(embedder.base_url, "https://proxy.internal/v1");

        let texts = vec!["hello".to_string()];
        let json = serde_json::to_value(embedder.build_request(&texts, InputType::Query)).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert!(json.get("input_type").is_none());
    }

    #[test]
    fn response_is_reordered_by_index() {
        let json = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let vectors = ordered_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[test]
    fn short_response_is_an_error() {
        let json = r#"{"data": [{"embedding": [0.1]}]}"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let err = ordered_embeddings(response, 2).unwrap_err();
        assert!(matches!(err, LensError::BackendUnavailable(_)));
    }

    #[test]
    fn ollama_response_parses() {
        let json = r#"{"model": "all-minilm", "embeddings": [[0.1, 0.2, 0.3]]}"#;
        let response: OllamaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.embeddings.len(), 1);
    }

    #[test]
    fn missing_api_key_is_backend_unavailable() {
        std::env::remove_var("VOYAGE_API_KEY");
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingBackend::from_config(&config).unwrap_err();
        assert!(matches!(err, LensError::BackendUnavailable(_)));
        assert!(err.to_string().contains("VOYAGE_API_KEY"), "{err}");
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            EmbeddingBackend::from_config(&config),
            Err(LensError::Config(_))
        ));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[test]
    fn ollama_defaults() {
        let backend = EmbeddingBackend::from_config(&EmbeddingConfig {
            provider: "ollama".into(),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(backend.provider(), "ollama");
        assert_eq!(backend.model(), "all-minilm");
    }

    #[tokio::test]
    async fn hash_vectors_are_deterministic_and_normalized() {
        let backend = hash_backend(128);
        let texts = vec!["Token parsing in auth".to_string(), "".to_string()];
        let a = backend.embed(&texts).await.unwrap();
        let b = backend.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 128);
        assert!((cosine(&a[0], &a[0]) - 1.0).abs() < 1e-5);
        assert!(a[1].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn hash_similarity_tracks_shared_words() {
        let backend = hash_backend(256);
        let query = backend.embed_query("verify the auth token").await.unwrap();
        let docs = backend
            .embed(&[
                "auth token verification lives here".to_string(),
                "render the pie chart".to_string(),
            ])
            .await
            .unwrap();
        assert!(cosine(&query, &docs[0]) > cosine(&query, &docs[1]));
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let config = EmbeddingConfig {
            api_key: Some("test-key".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            ..EmbeddingConfig::default()
        };
        let backend = EmbeddingBackend::from_config(&config).unwrap();
        assert!(backend.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_backend_unavailable() {
        let config = EmbeddingConfig {
            api_key: Some("test-key".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        };
        let backend = EmbeddingBackend::from_config(&config).unwrap();
        let err = backend.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, LensError::BackendUnavailable(_)), "{err}");
    }
}
