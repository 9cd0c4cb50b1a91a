//! Remote node representation

use serde::{Deserialize, Serialize};

/// Maximum tasks a node may hold before it stops being available
const MAX_ACTIVE_TASKS: usize = 3;

/// Connectivity state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

/// A remote agent running the same core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub active_tasks: Vec<u64>,
    #[serde(default)]
    pub last_heartbeat: Option<i64>,
}

impl RemoteNode {
    /// Create a node in the unknown state
    pub fn new(node_id: impl Into<String>, host: impl Into<String>, port: u16, capabilities: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            host: host.into(),
            port,
            capabilities,
            status: NodeStatus::Unknown,
            active_tasks: Vec::new(),
            last_heartbeat: None,
        }
    }

    /// Whether the node can take a new task: online, with spare capacity
    pub fn is_available(&self) -> bool {
        self.status == NodeStatus::Online && self.active_tasks.len() < MAX_ACTIVE_TASKS
    }

    /// Whether the node offers every requested capability
    pub fn has_capabilities(&self, requested: &[String]) -> bool {
        requested.iter().all(|cap| self.capabilities.contains(cap))
    }

    /// Track a task as active on this node
    pub fn add_active_task(&mut self, task_id: u64) {
        if !self.active_tasks.contains(&task_id) {
            self.active_tasks.push(task_id);
        }
    }

    /// Stop tracking a task
    pub fn remove_active_task(&mut self, task_id: u64) {
        self.active_tasks.retain(|&id| id != task_id);
    }

    /// Record a heartbeat
    pub fn heartbeat(&mut self, timestamp: i64) {
        self.last_heartbeat = Some(timestamp);
        self.status = NodeStatus::Online;
    }
}
