//! Answer composition on top of the repolens index.
//!
//! Retrieves ranked context for a question, builds the prompts, and asks an
//! OpenAI-compatible chat endpoint for the answer.

pub mod llm;
pub mod prompt;

use repolens_core::{LensError, RankedContext};
use repolens_index::VectorStore;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, LlmClient};

/// Reply used when retrieval finds nothing; the LLM is not called.
pub const NO_CONTEXT_ANSWER: &str =
    "No indexed content matched this question. Ingest the repository first or rephrase the question.";

/// A composed answer and the context it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text.
    pub text: String,
    /// Contexts passed to the model, best first.
    pub contexts: Vec<RankedContext>,
}

/// Retrieve the `k` nearest chunks for `question` as ranked contexts.
///
/// # Errors
///
/// Propagates query errors from the store.
pub async fn retrieve_contexts(
    store: &VectorStore,
    question: &str,
    k: usize,
) -> Result<Vec<RankedContext>, LensError> {
    Ok(store.query(question, k).await?.into_ranked())
}

/// Build the chat messages for `question` over `contexts`.
///
/// # Examples
///
/// ```
/// use repolens_answer::{compose_messages, llm::Role};
///
/// let messages = compose_messages("What does main do?", &[]);
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, Role::System);
/// assert!(messages[1].content.contains("What does main do?"));
/// ```
pub fn compose_messages(question: &str, contexts: &[RankedContext]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompt::build_system_prompt()),
        ChatMessage::user(prompt::build_user_prompt(question, contexts)),
    ]
}

/// Answer `question` from the `k` most relevant indexed chunks.
///
/// When retrieval returns nothing the answer is [`NO_CONTEXT_ANSWER`] and
/// no chat request is made.
///
/// # Errors
///
/// Returns store errors from retrieval and [`LensError::Llm`] if the chat
/// request fails.
pub async fn answer_question(
    store: &VectorStore,
    client: &LlmClient,
    question: &str,
    k: usize,
) -> Result<Answer, LensError> {
    let contexts = retrieve_contexts(store, question, k).await?;
    if contexts.is_empty() {
        tracing::info!("no context retrieved; skipping chat request");
        return Ok(Answer {
            text: NO_CONTEXT_ANSWER.to_string(),
            contexts,
        });
    }

    tracing::debug!(contexts = contexts.len(), model = client.model(), "composing answer");
    let text = client.chat(&compose_messages(question, &contexts)).await?;
    Ok(Answer { text, contexts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{EmbeddingConfig, LlmConfig, Metadata};
    use repolens_index::EmbeddingBackend;

    fn hash_store() -> VectorStore {
        let backend = EmbeddingBackend::from_config(&EmbeddingConfig {
            provider: "hash".into(),
            dimensions: 64,
            ..EmbeddingConfig::default()
        })
        .unwrap();
        VectorStore::in_memory("default", backend).unwrap()
    }

    fn offline_client() -> LlmClient {
        LlmClient::new(&LlmConfig {
            provider: "ollama".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 5,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    async fn seed(store: &VectorStore) {
        let mut meta = Metadata::new();
        meta.insert("path".into(), "src/auth.py".into());
        meta.insert("lang".into(), "py".into());
        store
            .add(
                &["a".to_string()],
                &["def login(user): return token".to_string()],
                &[meta],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_index_skips_the_model() {
        let store = hash_store();
        let answer = answer_question(&store, &offline_client(), "how do I log in?", 3)
            .await
            .unwrap();
        assert_eq!(answer.text, NO_CONTEXT_ANSWER);
        assert!(answer.contexts.is_empty());
    }

    #[tokio::test]
    async fn contexts_are_scored_from_distance() {
        let store = hash_store();
        seed(&store).await;
        let contexts = retrieve_contexts(&store, "def login(user): return token", 3)
            .await
            .unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].path(), "src/auth.py");
        assert!((contexts[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let store = hash_store();
        seed(&store).await;
        let err = answer_question(&store, &offline_client(), "login", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, LensError::Llm(_)), "{err}");
    }

    #[test]
    fn messages_carry_context() {
        let mut metadata = Metadata::new();
        metadata.insert("path".into(), "README.md".into());
        let ctx = RankedContext {
            text: "# Usage".into(),
            metadata,
            score: 0.7,
        };
        let messages = compose_messages("usage?", &[ctx]);
        assert!(messages[1].content.contains("PATH: README.md"));
    }
}
