//! Tool system - named invocable operations with schemas
//!
//! Tools return a `{output, error}` outcome where exactly one side is
//! non-empty in the success case. Subprocess-running tools route through the
//! sandbox and the command policy when those are configured on the
//! invocation context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::security::{CommandPolicy, Sandbox};

pub mod builtin;
mod parser;
mod registry;

pub use parser::{ParsedToolCall, extract_tool_calls};
pub use registry::ToolRegistry;

/// Schema describing a tool to the model
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool execution. In the success case exactly one of
/// `output`/`error` is non-empty; `error` is non-empty on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub output: String,
    pub error: String,
}

impl ToolOutcome {
    /// Successful outcome
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
        }
    }

    /// Failed outcome
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
        }
    }

    /// Whether the error side is set
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Execution context handed to tools
#[derive(Clone, Default)]
pub struct ToolInvocationContext {
    /// Working directory for file and command operations
    pub working_dir: PathBuf,

    /// Sandbox for subprocess-running tools (plain spawn when absent)
    pub sandbox: Option<Arc<Sandbox>>,

    /// Command policy filter (no filtering when absent)
    pub policy: Option<Arc<CommandPolicy>>,

    /// Timeout for subprocess tools
    pub timeout: Option<Duration>,
}

impl ToolInvocationContext {
    /// Context rooted at a working directory
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    /// Attach the security systems
    pub fn with_security(mut self, sandbox: Option<Arc<Sandbox>>, policy: Option<Arc<CommandPolicy>>) -> Self {
        self.sandbox = sandbox;
        self.policy = policy;
        self
    }

    /// Resolve a path inside the working directory. Escapes (via `..` or
    /// absolute paths outside the root) are rejected.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        };

        let root = self.working_dir.canonicalize().unwrap_or_else(|_| self.working_dir.clone());
        let canonical = if joined.exists() {
            joined.canonicalize().unwrap_or_else(|_| joined.clone())
        } else {
            match joined.parent() {
                Some(parent) if parent.exists() => parent
                    .canonicalize()
                    .unwrap_or_else(|_| parent.to_path_buf())
                    .join(joined.file_name().unwrap_or_default()),
                _ => joined.clone(),
            }
        };

        if canonical.starts_with(&root) {
            Ok(canonical)
        } else {
            Err(format!("Path {} escapes working directory", path))
        }
    }
}

impl std::fmt::Debug for ToolInvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvocationContext")
            .field("working_dir", &self.working_dir)
            .field("sandboxed", &self.sandbox.is_some())
            .field("filtered", &self.policy.is_some())
            .finish()
    }
}

/// A named invocable operation
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (what the model calls)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for arguments
    fn parameters(&self) -> Value;

    /// Execute with parsed arguments
    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome;

    /// Schema triple for prompt assembly
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Fetch a string argument
pub(crate) fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}
