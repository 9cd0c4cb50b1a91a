//! AccountManager - multi-credential pool per provider with cooldowns

use std::collections::BTreeMap;

use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::JsonStore;

/// Cooldown applied after an account is used
const DEFAULT_COOLDOWN_SECS: i64 = 7200;

/// One credential set for a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub credentials: Map<String, Value>,
    /// Higher is preferred
    pub priority: i64,
    pub created_at: i64,
    #[serde(default)]
    pub last_used: Option<i64>,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default)]
    pub cooldown_until: Option<i64>,
}

impl Account {
    /// Whether the account may be handed out now
    pub fn is_available(&self, now: i64) -> bool {
        self.cooldown_until.map(|until| until <= now).unwrap_or(true)
    }
}

/// Aggregate availability numbers for a provider (or all providers)
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountStats {
    pub total: usize,
    pub available: usize,
    pub in_cooldown: usize,
}

struct ManagerInner {
    store: JsonStore,
    accounts: BTreeMap<String, Vec<Account>>,
}

impl ManagerInner {
    fn persist(&mut self) -> Result<()> {
        // Full replace so a provider whose last account was removed also
        // disappears from disk
        let map = self
            .accounts
            .iter()
            .map(|(provider, accounts)| (provider.clone(), serde_json::to_value(accounts).unwrap_or_default()))
            .collect();
        self.store.replace_all(map)
    }
}

/// Process-wide account pool; all mutations persist atomically
pub struct AccountManager {
    inner: Mutex<ManagerInner>,
}

impl AccountManager {
    /// Open the pool over `data/accounts.json`
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = JsonStore::open(path)?;

        let mut accounts = BTreeMap::new();
        for (provider, value) in store.all() {
            if let Ok(list) = serde_json::from_value::<Vec<Account>>(value) {
                accounts.insert(provider, list);
            }
        }

        Ok(Self {
            inner: Mutex::new(ManagerInner { store, accounts }),
        })
    }

    /// Add an account. Fails if the id already exists for the provider.
    pub async fn add_account(
        &self,
        provider: &str,
        account_id: &str,
        credentials: Map<String, Value>,
        priority: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let list = inner.accounts.entry(provider.to_string()).or_default();

        if list.iter().any(|a| a.account_id == account_id) {
            return Ok(false);
        }

        list.push(Account {
            account_id: account_id.to_string(),
            credentials,
            priority,
            created_at: chrono::Utc::now().timestamp(),
            last_used: None,
            use_count: 0,
            cooldown_until: None,
        });

        debug!(provider, account_id, "Added account");
        inner.persist()?;
        Ok(true)
    }

    /// Remove an account; returns whether it existed
    pub async fn remove_account(&self, provider: &str, account_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let Some(list) = inner.accounts.get_mut(provider) else {
            return Ok(false);
        };

        let before = list.len();
        list.retain(|a| a.account_id != account_id);
        let removed = list.len() < before;
        if list.is_empty() {
            inner.accounts.remove(provider);
        }

        if removed {
            inner.persist()?;
        }
        Ok(removed)
    }

    /// Accounts for one provider (cloned), or all accounts when None
    pub async fn list_accounts(&self, provider: Option<&str>) -> Vec<Account> {
        let inner = self.inner.lock().await;
        match provider {
            Some(p) => inner.accounts.get(p).cloned().unwrap_or_default(),
            None => inner.accounts.values().flatten().cloned().collect(),
        }
    }

    /// Next available account: highest priority first, then soonest-free.
    /// Returns None when every account is cooling down.
    pub async fn get_next_available(&self, provider: &str) -> Option<Account> {
        let inner = self.inner.lock().await;
        let list = inner.accounts.get(provider)?;
        let now = chrono::Utc::now().timestamp();

        let mut sorted: Vec<&Account> = list.iter().collect();
        sorted.sort_by_key(|a| (-a.priority, a.cooldown_until.unwrap_or(0)));

        sorted.into_iter().find(|a| a.is_available(now)).cloned()
    }

    /// Mark an account used: stamps `last_used`, bumps `use_count`, and
    /// starts the default 2h cooldown
    pub async fn mark_used(&self, provider: &str, account_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let Some(account) = inner
            .accounts
            .get_mut(provider)
            .and_then(|list| list.iter_mut().find(|a| a.account_id == account_id))
        else {
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp();
        account.last_used = Some(now);
        account.use_count += 1;
        account.cooldown_until = Some(now + DEFAULT_COOLDOWN_SECS);

        inner.persist()?;
        Ok(true)
    }

    /// Explicit cooldown override for one account
    pub async fn set_cooldown(&self, provider: &str, account_id: &str, cooldown_secs: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let Some(account) = inner
            .accounts
            .get_mut(provider)
            .and_then(|list| list.iter_mut().find(|a| a.account_id == account_id))
        else {
            return Ok(false);
        };

        account.cooldown_until = Some(chrono::Utc::now().timestamp() + cooldown_secs);
        inner.persist()?;
        Ok(true)
    }

    /// Availability stats for a provider, or across all providers
    pub async fn stats(&self, provider: Option<&str>) -> AccountStats {
        let inner = self.inner.lock().await;
        let now = chrono::Utc::now().timestamp();

        let mut stats = AccountStats::default();
        for (name, list) in &inner.accounts {
            if provider.map(|p| p != name).unwrap_or(false) {
                continue;
            }
            for account in list {
                stats.total += 1;
                if account.is_available(now) {
                    stats.available += 1;
                } else {
                    stats.in_cooldown += 1;
                }
            }
        }
        stats
    }
}
