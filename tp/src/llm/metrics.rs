//! Per-provider metrics ledger: success/latency counters, rate-limit
//! detection, cooldowns, and the derived health score that drives routing.

use std::collections::{BTreeMap, HashMap};

use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::JsonStore;

/// Cooldown applied when a rate limit is detected
const RATE_LIMIT_COOLDOWN_SECS: i64 = 120;

/// Header/value fragments that indicate rate limiting
const RATE_LIMIT_INDICATORS: &[&str] = &["429", "rate_limit", "rate limit", "quota", "limit"];

/// Accumulated totals for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMetric {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub last_request_at: Option<i64>,
    pub rate_limited: bool,
    pub cooldown_until: Option<i64>,
}

/// One observed request
#[derive(Debug, Clone, Default)]
pub struct RequestSample {
    pub success: bool,
    pub latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub account_id: Option<String>,
}

/// Derived health view for one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub available: bool,
    pub health_score: f64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub rate_limited: bool,
    pub in_cooldown: bool,
}

struct LedgerInner {
    store: JsonStore,
    metrics: BTreeMap<String, ProviderMetric>,
}

impl LedgerInner {
    fn persist(&mut self) -> Result<()> {
        let entries = self
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), serde_json::to_value(metric).unwrap_or_default()))
            .collect();
        self.store.set_many(entries)
    }
}

/// Process-wide metrics service; every mutation holds the ledger lock and
/// persists atomically
pub struct MetricsLedger {
    inner: Mutex<LedgerInner>,
}

impl MetricsLedger {
    /// Open the ledger over `data/model_metrics.json`
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = JsonStore::open(path)?;

        let mut metrics = BTreeMap::new();
        for (name, value) in store.all() {
            if let Ok(metric) = serde_json::from_value::<ProviderMetric>(value) {
                metrics.insert(name, metric);
            }
        }

        Ok(Self {
            inner: Mutex::new(LedgerInner { store, metrics }),
        })
    }

    /// Record one generation (success or failure), updating counters and the
    /// rolling average latency
    pub async fn record_generation(&self, provider: &str, sample: RequestSample) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let metric = inner.metrics.entry(provider.to_string()).or_default();

        metric.total_requests += 1;
        if sample.success {
            metric.successful_requests += 1;
        } else {
            metric.failed_requests += 1;
        }

        metric.total_prompt_tokens += sample.prompt_tokens;
        metric.total_completion_tokens += sample.completion_tokens;
        metric.total_latency_ms += sample.latency_ms as f64;
        metric.avg_latency_ms = metric.total_latency_ms / metric.total_requests as f64;
        metric.last_request_at = Some(chrono::Utc::now().timestamp());

        debug!(
            provider,
            success = sample.success,
            latency_ms = sample.latency_ms,
            account = ?sample.account_id,
            "Recorded generation"
        );
        inner.persist()
    }

    /// Scan response headers for rate-limit indicators. On a hit, flags the
    /// provider and starts a 120s cooldown.
    pub async fn check_rate_limit(&self, provider: &str, headers: &HashMap<String, String>) -> Result<bool> {
        let hit = headers.values().any(|value| {
            let lower = value.to_lowercase();
            RATE_LIMIT_INDICATORS.iter().any(|needle| lower.contains(needle))
        });

        if hit {
            warn!(provider, "Rate limit detected from response headers");
            self.mark_rate_limited(provider, RATE_LIMIT_COOLDOWN_SECS).await?;
        }
        Ok(hit)
    }

    /// Flag a provider as rate limited with an explicit cooldown
    pub async fn mark_rate_limited(&self, provider: &str, cooldown_secs: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let metric = inner.metrics.entry(provider.to_string()).or_default();
        metric.rate_limited = true;
        metric.cooldown_until = Some(chrono::Utc::now().timestamp() + cooldown_secs);
        inner.persist()
    }

    /// Clear the rate-limited flag and cooldown
    pub async fn clear_rate_limit(&self, provider: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(metric) = inner.metrics.get_mut(provider) {
            metric.rate_limited = false;
            metric.cooldown_until = None;
            inner.persist()?;
        }
        Ok(())
    }

    /// Derived health for a provider. Unknown providers are healthy.
    pub async fn health(&self, provider: &str) -> ProviderHealth {
        let inner = self.inner.lock().await;

        let Some(metric) = inner.metrics.get(provider) else {
            return ProviderHealth {
                provider: provider.to_string(),
                available: true,
                health_score: 1.0,
                total_requests: 0,
                success_rate: 1.0,
                avg_latency_ms: 0.0,
                rate_limited: false,
                in_cooldown: false,
            };
        };

        let success_rate = metric.successful_requests as f64 / metric.total_requests.max(1) as f64;
        let failure_rate = metric.failed_requests as f64 / metric.total_requests.max(1) as f64;

        let mut score = if metric.rate_limited {
            success_rate.max(0.1) * 0.5
        } else if failure_rate > 0.2 {
            (success_rate * 0.7).max(0.1)
        } else {
            success_rate
        };

        let now = chrono::Utc::now().timestamp();
        let in_cooldown = metric.cooldown_until.map(|until| now < until).unwrap_or(false);
        if in_cooldown {
            score *= 0.5;
        }
        if metric.avg_latency_ms > 5000.0 {
            score *= 0.8;
        }

        ProviderHealth {
            provider: provider.to_string(),
            available: score > 0.5,
            health_score: score,
            total_requests: metric.total_requests,
            success_rate,
            avg_latency_ms: metric.avg_latency_ms,
            rate_limited: metric.rate_limited,
            in_cooldown,
        }
    }

    /// A provider is usable iff healthy and not cooling down
    pub async fn is_available(&self, provider: &str) -> bool {
        let health = self.health(provider).await;
        health.available && !health.in_cooldown
    }

    /// Snapshot of all tracked metrics (for status output)
    pub async fn snapshot(&self) -> BTreeMap<String, ProviderMetric> {
        self.inner.lock().await.metrics.clone()
    }
}
