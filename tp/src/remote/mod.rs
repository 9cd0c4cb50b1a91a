//! Remote-agent delegation: node registry and line-JSON wire protocol

mod client;
mod node;
mod protocol;
mod registry;

pub use client::delegate_task;
pub use node::{NodeStatus, RemoteNode};
pub use protocol::{Message, MessageType};
pub use registry::NodeRegistry;
