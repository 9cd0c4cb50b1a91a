//! Plugin hooks and manifest registry
//!
//! Plugins contribute `before_task`/`after_task` hooks around supervisor
//! executions. Hook failures are logged and swallowed; a failing plugin
//! never takes a task down with it. Manifests (name, version, enabled) are
//! persisted in `data/plugins.json`.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::Task;
use crate::store::JsonStore;

/// Installed plugin metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Lifecycle hooks a plugin may implement
#[async_trait]
pub trait PluginHook: Send + Sync {
    /// Plugin name (must match a manifest to be toggleable)
    fn name(&self) -> &'static str;

    /// Called before a task executes
    async fn before_task(&self, _task: &Task) -> Result<()> {
        Ok(())
    }

    /// Called after a task executes
    async fn after_task(&self, _task: &Task, _success: bool) -> Result<()> {
        Ok(())
    }
}

struct RegistryInner {
    store: JsonStore,
    manifests: Vec<PluginManifest>,
}

impl RegistryInner {
    fn persist(&mut self) -> Result<()> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .manifests
            .iter()
            .map(|m| (m.name.clone(), serde_json::to_value(m).unwrap_or_default()))
            .collect();
        self.store.set("plugins", map)
    }
}

/// Plugin registry: hook dispatch plus persisted manifests
pub struct PluginRegistry {
    hooks: Vec<Arc<dyn PluginHook>>,
    inner: Mutex<RegistryInner>,
}

impl PluginRegistry {
    /// Open over `data/plugins.json`
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = JsonStore::open(path)?;

        let manifests = store
            .get_as::<serde_json::Map<String, serde_json::Value>>("plugins")
            .map(|map| {
                map.into_values()
                    .filter_map(|v| serde_json::from_value::<PluginManifest>(v).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            hooks: Vec::new(),
            inner: Mutex::new(RegistryInner { store, manifests }),
        })
    }

    /// Register an in-process hook
    pub fn register_hook(&mut self, hook: Arc<dyn PluginHook>) {
        self.hooks.push(hook);
    }

    /// Install a manifest (replacing any with the same name)
    pub async fn install(&self, manifest: PluginManifest) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.manifests.retain(|m| m.name != manifest.name);
        inner.manifests.push(manifest);
        inner.persist()
    }

    /// Remove a manifest; returns whether it existed
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.manifests.len();
        inner.manifests.retain(|m| m.name != name);
        let removed = inner.manifests.len() < before;
        if removed {
            inner.persist()?;
        }
        Ok(removed)
    }

    /// Enable or disable a plugin; returns whether it was found
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(manifest) = inner.manifests.iter_mut().find(|m| m.name == name) else {
            return Ok(false);
        };
        manifest.enabled = enabled;
        inner.persist()?;
        Ok(true)
    }

    /// Installed manifests
    pub async fn list(&self) -> Vec<PluginManifest> {
        self.inner.lock().await.manifests.clone()
    }

    /// Run every enabled before-hook; failures are logged and swallowed
    pub async fn run_before(&self, task: &Task) {
        for hook in self.enabled_hooks().await {
            if let Err(e) = hook.before_task(task).await {
                warn!(plugin = hook.name(), task_id = task.id, error = %e, "before_task hook failed");
            }
        }
    }

    /// Run every enabled after-hook; failures are logged and swallowed
    pub async fn run_after(&self, task: &Task, success: bool) {
        for hook in self.enabled_hooks().await {
            if let Err(e) = hook.after_task(task, success).await {
                warn!(plugin = hook.name(), task_id = task.id, error = %e, "after_task hook failed");
            }
        }
    }

    /// Hooks not explicitly disabled by their manifest
    async fn enabled_hooks(&self) -> Vec<Arc<dyn PluginHook>> {
        let inner = self.inner.lock().await;
        self.hooks
            .iter()
            .filter(|hook| {
                inner
                    .manifests
                    .iter()
                    .find(|m| m.name == hook.name())
                    .map(|m| m.enabled)
                    .unwrap_or(true)
            })
            .map(Arc::clone)
            .collect()
    }
}
