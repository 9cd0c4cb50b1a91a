//! NodeRegistry - persisted registry of remote nodes

use std::collections::BTreeMap;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::JsonStore;

use super::node::{NodeStatus, RemoteNode};

struct RegistryInner {
    store: JsonStore,
    nodes: BTreeMap<String, RemoteNode>,
}

impl RegistryInner {
    fn persist(&mut self) -> Result<()> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), serde_json::to_value(node).unwrap_or_default()))
            .collect();
        self.store.set("nodes", map)
    }
}

/// Registry of known remote nodes, persisted to `data/nodes.json`
pub struct NodeRegistry {
    inner: Mutex<RegistryInner>,
}

impl NodeRegistry {
    /// Open the registry
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = JsonStore::open(path)?;

        let nodes = store
            .get_as::<serde_json::Map<String, serde_json::Value>>("nodes")
            .map(|map| {
                map.into_iter()
                    .filter_map(|(id, v)| serde_json::from_value::<RemoteNode>(v).ok().map(|n| (id, n)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            inner: Mutex::new(RegistryInner { store, nodes }),
        })
    }

    /// Register (or replace) a node
    pub async fn register(&self, node: RemoteNode) -> Result<()> {
        let mut inner = self.inner.lock().await;
        debug!(node_id = %node.node_id, "Registered node");
        inner.nodes.insert(node.node_id.clone(), node);
        inner.persist()
    }

    /// Remove a node; returns whether it existed
    pub async fn remove(&self, node_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let existed = inner.nodes.remove(node_id).is_some();
        if existed {
            inner.persist()?;
        }
        Ok(existed)
    }

    /// All nodes (cloned), ordered by id
    pub async fn list(&self) -> Vec<RemoteNode> {
        self.inner.lock().await.nodes.values().cloned().collect()
    }

    /// Look up one node
    pub async fn get(&self, node_id: &str) -> Option<RemoteNode> {
        self.inner.lock().await.nodes.get(node_id).cloned()
    }

    /// First available node offering every requested capability
    pub async fn find_available(&self, capabilities: &[String]) -> Option<RemoteNode> {
        self.inner
            .lock()
            .await
            .nodes
            .values()
            .find(|n| n.is_available() && n.has_capabilities(capabilities))
            .cloned()
    }

    /// Record a heartbeat for a node; returns whether the node is known
    pub async fn heartbeat(&self, node_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(node) = inner.nodes.get_mut(node_id) else {
            return Ok(false);
        };
        node.heartbeat(chrono::Utc::now().timestamp());
        inner.persist()?;
        Ok(true)
    }

    /// Update a node's status
    pub async fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(node) = inner.nodes.get_mut(node_id) else {
            return Ok(false);
        };
        node.status = status;
        inner.persist()?;
        Ok(true)
    }

    /// Track or untrack a delegated task on a node
    pub async fn set_task_active(&self, node_id: &str, task_id: u64, active: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(node) = inner.nodes.get_mut(node_id) {
            if active {
                node.add_active_task(task_id);
            } else {
                node.remove_active_task(task_id);
            }
            inner.persist()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online_node(id: &str, caps: &[&str]) -> RemoteNode {
        let mut node = RemoteNode::new(id, "127.0.0.1", 7070, caps.iter().map(|s| s.to_string()).collect());
        node.heartbeat(1);
        node
    }

    #[tokio::test]
    async fn test_find_available_matches_capabilities() {
        let temp = tempfile::tempdir().unwrap();
        let registry = NodeRegistry::open(temp.path().join("nodes.json")).unwrap();

        registry.register(online_node("cpu-node", &["general"])).await.unwrap();
        registry.register(online_node("gpu-node", &["general", "gpu"])).await.unwrap();

        let found = registry.find_available(&["gpu".to_string()]).await.unwrap();
        assert_eq!(found.node_id, "gpu-node");

        assert!(registry.find_available(&["quantum".to_string()]).await.is_none());
    }

    #[tokio::test]
    async fn test_offline_node_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let registry = NodeRegistry::open(temp.path().join("nodes.json")).unwrap();

        let node = RemoteNode::new("cold", "127.0.0.1", 7070, vec!["general".to_string()]);
        registry.register(node).await.unwrap();

        assert!(registry.find_available(&["general".to_string()]).await.is_none());

        registry.heartbeat("cold").await.unwrap();
        assert!(registry.find_available(&["general".to_string()]).await.is_some());
    }

    #[tokio::test]
    async fn test_saturated_node_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let registry = NodeRegistry::open(temp.path().join("nodes.json")).unwrap();

        registry.register(online_node("busy", &["general"])).await.unwrap();
        for task_id in 1..=3 {
            registry.set_task_active("busy", task_id, true).await.unwrap();
        }

        assert!(registry.find_available(&["general".to_string()]).await.is_none());

        registry.set_task_active("busy", 1, false).await.unwrap();
        assert!(registry.find_available(&["general".to_string()]).await.is_some());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nodes.json");

        {
            let registry = NodeRegistry::open(&path).unwrap();
            registry.register(online_node("kept", &["general"])).await.unwrap();
        }

        let registry = NodeRegistry::open(&path).unwrap();
        assert!(registry.get("kept").await.is_some());
    }
}
