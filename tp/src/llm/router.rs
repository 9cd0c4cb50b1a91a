//! ModelRouter - provider selection, metric recording, and rotation glue

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::AccountRotator;

use super::metrics::{MetricsLedger, RequestSample};
use super::policy::{ProviderCandidate, RouterPolicy};
use super::{DummyProvider, OpenAiProvider, PromptContext, Provider, ProviderError};

/// Routes generation calls to a provider, guided by policy, metrics, and
/// the account rotator
pub struct ModelRouter {
    providers: Vec<(String, Arc<dyn Provider>)>,
    default_provider: String,
    metrics: Arc<MetricsLedger>,
    policy: Option<RouterPolicy>,
    rotator: Option<Arc<AccountRotator>>,
}

impl ModelRouter {
    /// Create a router with the built-in providers registered. The default
    /// is "openai" iff `OPENAI_API_KEY` is present, else "dummy".
    pub fn new(metrics: Arc<MetricsLedger>, policy: Option<RouterPolicy>, rotator: Option<Arc<AccountRotator>>) -> Self {
        let mut router = Self {
            providers: Vec::new(),
            default_provider: "dummy".to_string(),
            metrics,
            policy,
            rotator,
        };

        router.register("dummy", Arc::new(DummyProvider));
        if let Ok(openai) = OpenAiProvider::from_env() {
            router.register("openai", Arc::new(openai));
        }

        if std::env::var("OPENAI_API_KEY").is_ok() {
            router.default_provider = "openai".to_string();
        }

        router
    }

    /// A router with no providers registered (callers register their own)
    pub fn bare(metrics: Arc<MetricsLedger>, policy: Option<RouterPolicy>, rotator: Option<Arc<AccountRotator>>) -> Self {
        Self {
            providers: Vec::new(),
            default_provider: "dummy".to_string(),
            metrics,
            policy,
            rotator,
        }
    }

    /// Register (or replace) a provider; registration order is the policy
    /// tie-break order
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        self.providers.retain(|(n, _)| *n != name);
        self.providers.push((name, provider));
    }

    /// Registered provider names, in registration order
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|(n, _)| n == name).map(|(_, p)| Arc::clone(p))
    }

    /// Name of the default provider
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Override the default provider (must be registered)
    pub fn set_default(&mut self, name: &str) -> Result<(), ProviderError> {
        if self.get(name).is_none() {
            return Err(ProviderError::UnknownProvider(name.to_string()));
        }
        self.default_provider = name.to_string();
        Ok(())
    }

    /// Shared metrics ledger
    pub fn metrics(&self) -> &Arc<MetricsLedger> {
        &self.metrics
    }

    /// Generate a response, selecting the provider when none is forced
    pub async fn generate(
        &self,
        prompt: &str,
        context: &PromptContext,
        provider_name: Option<&str>,
    ) -> Result<String, ProviderError> {
        let (name, provider) = self.resolve(prompt, context, provider_name).await;
        let account_id = self.select_account(&name, provider.as_ref()).await;

        let start = Instant::now();
        let result = provider.generate(prompt, context).await;
        self.record(&name, prompt, &result, account_id, start).await;
        result
    }

    /// Streaming variant of [`generate`](Self::generate); falls back to a
    /// single chunk for non-streaming providers
    pub async fn generate_stream(
        &self,
        prompt: &str,
        context: &PromptContext,
        provider_name: Option<&str>,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let (name, provider) = self.resolve(prompt, context, provider_name).await;
        let account_id = self.select_account(&name, provider.as_ref()).await;

        let start = Instant::now();
        let result = provider.generate_stream(prompt, context, chunk_tx).await;
        self.record(&name, prompt, &result, account_id, start).await;
        result
    }

    /// Resolve the provider: explicit name, else policy choice, else default.
    /// Unknown names fall back to the dummy provider.
    async fn resolve(
        &self,
        prompt: &str,
        context: &PromptContext,
        provider_name: Option<&str>,
    ) -> (String, Arc<dyn Provider>) {
        let mut name = provider_name.map(str::to_string);

        if name.is_none() {
            if let Some(policy) = &self.policy {
                let goal = context
                    .task_goal
                    .clone()
                    .unwrap_or_else(|| prompt.chars().take(100).collect());
                let candidates: Vec<ProviderCandidate> = self
                    .providers
                    .iter()
                    .map(|(n, p)| ProviderCandidate {
                        name: n.clone(),
                        supports_streaming: p.supports_streaming(),
                    })
                    .collect();
                name = policy.select_provider(&goal, &candidates).await;
            }
        }

        let name = name.unwrap_or_else(|| self.default_provider.clone());
        match self.get(&name) {
            Some(provider) => (name, provider),
            None => {
                warn!(requested = %name, "Unknown provider, falling back to dummy");
                ("dummy".to_string(), self.get("dummy").unwrap_or(Arc::new(DummyProvider)))
            }
        }
    }

    async fn select_account(&self, name: &str, provider: &dyn Provider) -> Option<String> {
        if !provider.requires_auth() {
            return None;
        }
        let rotator = self.rotator.as_ref()?;
        let account = rotator.select_account(name).await;
        if let Some(account) = &account {
            debug!(provider = name, account, "Selected account");
        }
        account
    }

    /// Record metrics for a finished call; rate-limit errors start the
    /// provider cooldown so policy routes elsewhere next time
    async fn record(
        &self,
        name: &str,
        prompt: &str,
        result: &Result<String, ProviderError>,
        account_id: Option<String>,
        start: Instant,
    ) {
        let latency_ms = start.elapsed().as_millis() as u64;

        let sample = match result {
            Ok(response) => RequestSample {
                success: true,
                latency_ms,
                prompt_tokens: prompt.split_whitespace().count() as u64,
                completion_tokens: response.split_whitespace().count() as u64,
                account_id,
            },
            Err(_) => RequestSample {
                success: false,
                latency_ms,
                prompt_tokens: prompt.split_whitespace().count() as u64,
                completion_tokens: 0,
                account_id,
            },
        };

        if let Err(e) = self.metrics.record_generation(name, sample).await {
            warn!(provider = name, error = %e, "Failed to record metrics");
        }

        if let Err(ProviderError::RateLimited { retry_after }) = result {
            let _ = self.metrics.mark_rate_limited(name, retry_after.as_secs() as i64).await;
        }
    }
}
