//! Dummy provider for development and tests without API keys

use async_trait::async_trait;

use super::{AuthType, PromptContext, Provider, ProviderError};

/// Deterministic provider: echoes a truncated form of the prompt
pub struct DummyProvider;

#[async_trait]
impl Provider for DummyProvider {
    async fn generate(&self, prompt: &str, _context: &PromptContext) -> Result<String, ProviderError> {
        let head: String = prompt.chars().take(50).collect();
        let ellipsis = if prompt.chars().count() > 50 { "..." } else { "" };
        Ok(format!("[dummy] processed: {}{}", head, ellipsis))
    }

    fn auth_type(&self) -> AuthType {
        AuthType::ApiKey
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_echoes_prompt_head() {
        let provider = DummyProvider;
        let out = provider.generate("short prompt", &PromptContext::default()).await.unwrap();
        assert_eq!(out, "[dummy] processed: short prompt");
    }

    #[tokio::test]
    async fn test_dummy_truncates_long_prompts() {
        let provider = DummyProvider;
        let long = "x".repeat(200);
        let out = provider.generate(&long, &PromptContext::default()).await.unwrap();
        assert!(out.ends_with("..."));
        assert!(out.len() < 80);
    }

    #[test]
    fn test_dummy_does_not_stream() {
        assert!(!DummyProvider.supports_streaming());
    }
}
