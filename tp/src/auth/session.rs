//! Persistent auth session storage backing `auth login/status/logout`

use eyre::Result;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::store::JsonStore;

/// Stores per-provider auth data in `data/auth_sessions.json`
pub struct AuthSessionStore {
    store: Mutex<JsonStore>,
}

impl AuthSessionStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            store: Mutex::new(JsonStore::open(path)?),
        })
    }

    /// Record a login session for a provider
    pub async fn save_session(&self, provider: &str, auth_data: Map<String, Value>) -> Result<()> {
        self.store.lock().await.set(provider, auth_data)?;
        info!(provider, "Saved auth session");
        Ok(())
    }

    /// Fetch a provider's session, if any
    pub async fn get_session(&self, provider: &str) -> Option<Map<String, Value>> {
        self.store.lock().await.get_as(provider)
    }

    /// Whether a session exists
    pub async fn has_session(&self, provider: &str) -> bool {
        self.store.lock().await.get(provider).is_some()
    }

    /// Drop a provider's session; returns whether one existed
    pub async fn delete_session(&self, provider: &str) -> Result<bool> {
        let existed = self.store.lock().await.delete(provider)?;
        if existed {
            info!(provider, "Deleted auth session");
        }
        Ok(existed)
    }

    /// Stub login flow: records a placeholder token. Real providers replace
    /// this with their own exchange.
    pub async fn login(&self, provider: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert("access_token".to_string(), Value::from(format!("session-{}", uuid::Uuid::now_v7())));
        data.insert("logged_in_at".to_string(), Value::from(chrono::Utc::now().to_rfc3339()));
        self.save_session(provider, data).await
    }
}
