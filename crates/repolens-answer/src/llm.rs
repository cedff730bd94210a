use std::time::Duration;

use repolens_core::{LensError, LlmConfig};
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use repolens_answer::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("How is auth wired up?");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use repolens_answer::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes `/v1/chat/completions`. The `openai`
/// provider needs an API key; `ollama` talks to a local daemon without one.
///
/// # Examples
///
/// ```
/// use repolens_core::LlmConfig;
/// use repolens_answer::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o-mini");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a client from configuration.
    ///
    /// For `openai` the key comes from `config.api_key`, then
    /// `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Llm`] if the provider is unknown, the `openai`
    /// provider has no key, or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, LensError> {
        Self::with_env(config, |key| std::env::var(key).ok())
    }

    fn with_env<F>(config: &LlmConfig, lookup: F) -> Result<Self, LensError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (default_base, api_key) = match config.provider.as_str() {
            "openai" => {
                let key = config
                    .api_key
                    .clone()
                    .or_else(|| lookup("OPENAI_API_KEY"))
                    .ok_or_else(|| {
                        LensError::Llm(
                            "no API key for the openai provider: set llm.api_key or OPENAI_API_KEY"
                                .into(),
                        )
                    })?;
                (OPENAI_BASE_URL, Some(key))
            }
            "ollama" => (OLLAMA_BASE_URL, config.api_key.clone()),
            other => return Err(LensError::Llm(format!("unknown llm provider '{other}'"))),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LensError::Llm(format!("failed to create HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            config: config.clone(),
            base_url,
            api_key,
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Endpoint the client posts to.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Llm`] on HTTP errors or response parsing failures.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LensError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LensError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LensError::Llm(format!("LLM API error {status}: {body_text}")));
        }

        let response_body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LensError::Llm(format!("failed to parse response: {e}")))?;

        let content = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LensError::Llm("response contained no message content".into()))?;
        tracing::debug!(model = %self.config.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn openai_without_key_is_rejected() {
        let err = LlmClient::with_env(&LlmConfig::default(), no_env).unwrap_err();
        assert!(matches!(err, LensError::Llm(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn openai_key_falls_back_to_env() {
        let client = LlmClient::with_env(&LlmConfig::default(), |key| {
            (key == "OPENAI_API_KEY").then(|| "sk-env".to_string())
        })
        .unwrap();
        assert_eq!(client.api_key.as_deref(), Some("sk-env"));
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::with_env(&config, no_env).unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.model(), "llama3");
    }

    #[test]
    fn custom_base_url_drops_trailing_slash() {
        let config = LlmConfig {
            provider: "ollama".into(),
            base_url: Some("http://gpu-box:8000/".into()),
            ..LlmConfig::default()
        };
        let client = LlmClient::with_env(&config, no_env).unwrap();
        assert_eq!(client.endpoint(), "http://gpu-box:8000/v1/chat/completions");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "bard".into(),
            ..LlmConfig::default()
        };
        assert!(LlmClient::with_env(&config, no_env).is_err());
    }

    #[test]
    fn chat_message_serializes() {
        let msg = ChatMessage::system("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn parses_completion_body() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_llm_error() {
        let config = LlmConfig {
            provider: "ollama".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 5,
            ..LlmConfig::default()
        };
        let client = LlmClient::with_env(&config, no_env).unwrap();
        let err = client.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LensError::Llm(_)), "{err}");
    }
}
