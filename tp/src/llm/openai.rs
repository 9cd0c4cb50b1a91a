//! OpenAI-compatible chat completions provider
//!
//! Blocking and SSE-streaming generation against any endpoint speaking the
//! `/v1/chat/completions` protocol. The API key is resolved from the
//! environment on each call so rotation/login can take effect without a
//! restart.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::{AuthType, PromptContext, Provider, ProviderError};

/// Configuration for the OpenAI provider
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout: Duration::from_secs(120),
            max_tokens: 4096,
        }
    }
}

/// OpenAI chat completions client
pub struct OpenAiProvider {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiProvider {
    /// Create a provider from configuration
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { config, http })
    }

    /// Create a provider with default configuration
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(OpenAiConfig::default())
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        std::env::var(&self.config.api_key_env).map_err(|_| ProviderError::MissingCredentials("openai".to_string()))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, prompt: &str, context: &PromptContext, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();

        if let Some(goal) = &context.task_goal {
            messages.push(serde_json::json!({
                "role": "system",
                "content": format!("You are an autonomous task executor. Current goal: {}", goal),
            }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "stream": stream,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, prompt: &str, context: &PromptContext) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let body = self.build_body(prompt, context, false);

        debug!(model = %self.config.model, "OpenAI completion request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("empty choices".to_string()))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &PromptContext,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let body = self.build_body(prompt, context, true);

        let request = self.http.post(self.endpoint()).bearer_auth(api_key).json(&body);

        let mut source = EventSource::new(request).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let mut full = String::new();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        break;
                    }
                    let Ok(chunk) = serde_json::from_str::<ChatChunk>(&message.data) else {
                        continue;
                    };
                    if let Some(text) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                        full.push_str(&text);
                        let _ = chunk_tx.send(text).await;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    return Err(ProviderError::InvalidResponse(e.to_string()));
                }
            }
        }

        source.close();
        Ok(full)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn auth_type(&self) -> AuthType {
        AuthType::ApiKey
    }

    fn requires_auth(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            base_url: "https://api.example.com/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(provider.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_body_includes_goal_system_message() {
        let provider = OpenAiProvider::from_env().unwrap();
        let ctx = PromptContext::for_goal("refactor the parser");
        let body = provider.build_body("step 1", &ctx, false);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("refactor the parser"));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_key_is_credentials_error() {
        // SAFETY: test is serialized; no other thread reads the env here
        unsafe { std::env::remove_var("OPENAI_API_KEY") };

        let provider = OpenAiProvider::from_env().unwrap();
        let err = provider.generate("hi", &PromptContext::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(_)));
    }
}
