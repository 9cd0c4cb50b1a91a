//! LLM provider abstraction and routing
//!
//! Providers expose a uniform `generate` contract; the [`ModelRouter`]
//! layers policy-driven selection, metrics recording, and account rotation
//! on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

mod dummy;
mod error;
pub mod metrics;
pub mod policy;
pub mod router;

mod openai;

pub use dummy::DummyProvider;
pub use error::ProviderError;
pub use metrics::{MetricsLedger, ProviderHealth, ProviderMetric, RequestSample};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use policy::{ProviderCandidate, RouterPolicy};
pub use router::ModelRouter;

/// Authentication scheme a provider requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    ApiKey,
    OAuth,
    Hybrid,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => write!(f, "apikey"),
            Self::OAuth => write!(f, "oauth"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Context handed to a provider alongside the prompt
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub task_id: Option<u64>,
    pub task_goal: Option<String>,
    pub status: Option<String>,
    /// Last few steps of the task, serialized
    pub recent_steps: Vec<Value>,
    /// Tool schemas available this step
    pub available_tools: Vec<Value>,
}

impl PromptContext {
    /// Context carrying only a goal
    pub fn for_goal(goal: impl Into<String>) -> Self {
        Self {
            task_goal: Some(goal.into()),
            ..Default::default()
        }
    }
}

/// An external LLM backend behind a uniform generate contract
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a response for the prompt
    async fn generate(&self, prompt: &str, context: &PromptContext) -> Result<String, ProviderError>;

    /// Stream a response, sending chunks as they arrive and returning the
    /// full text. The default falls back to one full-response chunk.
    async fn generate_stream(
        &self,
        prompt: &str,
        context: &PromptContext,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let response = self.generate(prompt, context).await?;
        let _ = chunk_tx.send(response.clone()).await;
        Ok(response)
    }

    /// Whether `generate_stream` produces incremental chunks
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Authentication scheme this provider uses
    fn auth_type(&self) -> AuthType;

    /// Whether calls should draw an account from the rotator
    fn requires_auth(&self) -> bool {
        false
    }
}
