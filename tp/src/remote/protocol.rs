//! Wire protocol for node communication
//!
//! Each message is a single line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Message types for node communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Heartbeat,
    TaskAssign,
    TaskUpdate,
    TaskComplete,
    TaskError,
    NodeStatus,
    Shutdown,
}

/// A protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Message {
    fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payload: Map::new(),
            node_id: None,
            task_id: None,
            error: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// Heartbeat from a node
    pub fn heartbeat(node_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::Heartbeat);
        msg.node_id = Some(node_id.into());
        msg.payload.insert("status".to_string(), Value::from("alive"));
        msg
    }

    /// Assign a task to a node
    pub fn task_assign(node_id: impl Into<String>, task_id: u64, goal: impl Into<String>, priority: &str) -> Self {
        let mut msg = Self::new(MessageType::TaskAssign);
        msg.node_id = Some(node_id.into());
        msg.task_id = Some(task_id);
        msg.payload.insert("goal".to_string(), Value::from(goal.into()));
        msg.payload.insert("priority".to_string(), Value::from(priority));
        msg
    }

    /// Progress update for a delegated task
    pub fn task_update(node_id: impl Into<String>, task_id: u64, step: &str, output: &str) -> Self {
        let mut msg = Self::new(MessageType::TaskUpdate);
        msg.node_id = Some(node_id.into());
        msg.task_id = Some(task_id);
        msg.payload.insert("step".to_string(), Value::from(step));
        msg.payload.insert("output".to_string(), Value::from(output));
        msg
    }

    /// Completion notice for a delegated task
    pub fn task_complete(node_id: impl Into<String>, task_id: u64, result: &str) -> Self {
        let mut msg = Self::new(MessageType::TaskComplete);
        msg.node_id = Some(node_id.into());
        msg.task_id = Some(task_id);
        msg.payload.insert("result".to_string(), Value::from(result));
        msg
    }

    /// Failure notice for a delegated task
    pub fn task_error(node_id: impl Into<String>, task_id: u64, error: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::TaskError);
        msg.node_id = Some(node_id.into());
        msg.task_id = Some(task_id);
        msg.error = Some(error.into());
        msg
    }

    /// Shutdown request for a node
    pub fn shutdown(node_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::Shutdown);
        msg.node_id = Some(node_id.into());
        msg
    }

    /// Encode as one line of JSON (no trailing newline)
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode from a line of JSON
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_identity() {
        let original = Message::task_assign("node-1", 42, "run the tests", "high");
        let line = original.encode();
        let decoded = Message::decode(&line).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.msg_type, MessageType::TaskAssign);
        assert_eq!(decoded.task_id, Some(42));
        assert_eq!(decoded.payload["goal"], "run the tests");
    }

    #[test]
    fn test_msg_type_snake_case() {
        let line = Message::heartbeat("n").encode();
        assert!(line.contains("\"heartbeat\""));
    }

    #[test]
    fn test_decode_garbage_errors() {
        assert!(Message::decode("not json at all").is_err());
    }

    #[test]
    fn test_task_error_carries_error_field() {
        let msg = Message::task_error("n", 7, "worker crashed");
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.error.as_deref(), Some("worker crashed"));
    }
}
