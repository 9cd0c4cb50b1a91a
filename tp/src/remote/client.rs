//! Delegation client - ship a task to a remote node over TCP
//!
//! Best-effort: any transport error surfaces to the supervisor, which falls
//! back to local execution.

use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::domain::Task;

use super::node::RemoteNode;
use super::protocol::{Message, MessageType};

/// Timeout for the whole assign/acknowledge exchange
const DELEGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Send a task to a node and wait for its terminal response.
///
/// Returns the node's TASK_COMPLETE message on success. TASK_ERROR and
/// unexpected responses are errors, as is any connect/read failure.
pub async fn delegate_task(node: &RemoteNode, task: &Task) -> Result<Message> {
    let addr = format!("{}:{}", node.host, node.port);
    debug!(node_id = %node.node_id, addr, task_id = task.id, "Delegating task");

    let exchange = async {
        let stream = TcpStream::connect(&addr).await.context("Failed to connect to node")?;
        let (read_half, mut write_half) = stream.into_split();

        let assign = Message::task_assign(&node.node_id, task.id, &task.goal, &task.priority.to_string());
        write_half
            .write_all(format!("{}\n", assign.encode()).as_bytes())
            .await
            .context("Failed to send task assignment")?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        // Read until a terminal message; TASK_UPDATE lines are progress
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await.context("Failed to read node response")?;
            if n == 0 {
                return Err(eyre!("Node closed connection before completing task"));
            }

            let message = Message::decode(&line).context("Invalid node response")?;
            match message.msg_type {
                MessageType::TaskUpdate => {
                    debug!(task_id = task.id, "Remote progress: {:?}", message.payload.get("step"));
                }
                MessageType::TaskComplete => {
                    info!(node_id = %node.node_id, task_id = task.id, "Remote task complete");
                    return Ok(message);
                }
                MessageType::TaskError => {
                    return Err(eyre!(
                        "Remote task failed: {}",
                        message.error.unwrap_or_else(|| "unknown error".to_string())
                    ));
                }
                other => return Err(eyre!("Unexpected response type: {:?}", other)),
            }
        }
    };

    tokio::time::timeout(DELEGATION_TIMEOUT, exchange)
        .await
        .map_err(|_| eyre!("Delegation to {} timed out", node.node_id))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::node::NodeStatus;
    use tokio::net::TcpListener;

    fn task() -> Task {
        Task::new(9, "delegated goal")
    }

    #[tokio::test]
    async fn test_delegate_happy_path() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let assign = Message::decode(&line).unwrap();
            assert_eq!(assign.msg_type, MessageType::TaskAssign);

            let done = Message::task_complete("fake-node", assign.task_id.unwrap(), "success");
            write_half.write_all(format!("{}\n", done.encode()).as_bytes()).await.unwrap();
        });

        let mut node = RemoteNode::new("fake-node", addr.ip().to_string(), addr.port(), vec!["general".to_string()]);
        node.status = NodeStatus::Online;

        let response = delegate_task(&node, &task()).await.unwrap();
        assert_eq!(response.msg_type, MessageType::TaskComplete);
        assert_eq!(response.payload["result"], "success");
    }

    #[tokio::test]
    async fn test_delegate_error_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();

            let err = Message::task_error("fake-node", 9, "no capacity");
            write_half.write_all(format!("{}\n", err.encode()).as_bytes()).await.unwrap();
        });

        let mut node = RemoteNode::new("fake-node", addr.ip().to_string(), addr.port(), vec![]);
        node.status = NodeStatus::Online;

        let err = delegate_task(&node, &task()).await.unwrap_err();
        assert!(err.to_string().contains("no capacity"));
    }

    #[tokio::test]
    async fn test_delegate_connection_refused() {
        // Port 1 is essentially never listening
        let mut node = RemoteNode::new("ghost", "127.0.0.1", 1, vec![]);
        node.status = NodeStatus::Online;

        assert!(delegate_task(&node, &task()).await.is_err());
    }
}
