//! AccountRotator - automatic account selection over the manager's cooldowns

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::accounts::AccountManager;

/// Rotation snapshot for one provider
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub provider: String,
    pub total: usize,
    pub available: usize,
    pub in_cooldown: usize,
    pub needs_rotation: bool,
}

/// Selects accounts for provider calls, marking each selection used so the
/// pool naturally rotates through its cooldowns
pub struct AccountRotator {
    manager: Arc<AccountManager>,
}

impl AccountRotator {
    pub fn new(manager: Arc<AccountManager>) -> Self {
        Self { manager }
    }

    /// Pick the best available account and start its cooldown. None when the
    /// provider has no usable account.
    pub async fn select_account(&self, provider: &str) -> Option<String> {
        let account = self.manager.get_next_available(provider).await?;
        let account_id = account.account_id;

        if let Err(e) = self.manager.mark_used(provider, &account_id).await {
            debug!(provider, account_id, error = %e, "Failed to mark account used");
        }

        Some(account_id)
    }

    /// Current rotation posture for a provider
    pub async fn status(&self, provider: &str) -> RotationStatus {
        let stats = self.manager.stats(Some(provider)).await;
        RotationStatus {
            provider: provider.to_string(),
            total: stats.total,
            available: stats.available,
            in_cooldown: stats.in_cooldown,
            needs_rotation: stats.in_cooldown > 0 && stats.available > 0,
        }
    }
}
