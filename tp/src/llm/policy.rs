//! RouterPolicy - scoring over the metrics ledger for provider choice

use std::sync::Arc;

use tracing::debug;

use super::metrics::MetricsLedger;

/// A provider the policy may choose between
#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    pub name: String,
    pub supports_streaming: bool,
}

/// Policy-driven provider selection.
///
/// Scores each available provider in [0, 1]:
/// health x 0.4, latency band bonus (up to 0.3), success-rate bonus (up to
/// 0.2), streaming bonus 0.1, rate-limit penalty 0.3. Ties break by
/// registration order.
pub struct RouterPolicy {
    metrics: Arc<MetricsLedger>,
    allow_streaming: bool,
}

impl RouterPolicy {
    pub fn new(metrics: Arc<MetricsLedger>) -> Self {
        Self {
            metrics,
            allow_streaming: true,
        }
    }

    /// Disable the streaming bonus
    pub fn without_streaming(mut self) -> Self {
        self.allow_streaming = false;
        self
    }

    /// Pick the best provider for a goal, or None when nothing is available
    pub async fn select_provider(&self, task_goal: &str, candidates: &[ProviderCandidate]) -> Option<String> {
        let mut best: Option<(f64, &ProviderCandidate)> = None;

        for candidate in candidates {
            if !self.metrics.is_available(&candidate.name).await {
                continue;
            }

            let score = self.score(candidate).await;
            debug!(provider = %candidate.name, score, goal = task_goal, "Scored provider");

            // Strictly-greater keeps earlier registrations on ties
            match best {
                Some((top, _)) if score <= top => {}
                _ => best = Some((score, candidate)),
            }
        }

        best.map(|(_, c)| c.name.clone())
    }

    async fn score(&self, candidate: &ProviderCandidate) -> f64 {
        let health = self.metrics.health(&candidate.name).await;

        if !health.available || health.in_cooldown {
            return 0.0;
        }

        let mut score = health.health_score * 0.4;

        score += match health.avg_latency_ms {
            l if l < 2000.0 => 0.3,
            l if l < 5000.0 => 0.2,
            l if l < 10000.0 => 0.1,
            _ => 0.0,
        };

        if health.success_rate > 0.9 {
            score += 0.2;
        } else if health.success_rate > 0.7 {
            score += 0.1;
        }

        if self.allow_streaming && candidate.supports_streaming {
            score += 0.1;
        }

        if health.rate_limited {
            score -= 0.3;
        }

        score.clamp(0.0, 1.0)
    }
}
