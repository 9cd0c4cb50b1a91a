//! Write file tool

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

/// Write content to a file, creating parent directories
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file relative to the working directory, creating parents as needed"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let Some(path) = arg_str(args, "path") else {
            return ToolOutcome::failure("write_file requires a 'path' argument");
        };
        let content = arg_str(args, "content").unwrap_or_default();

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::failure(e),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutcome::failure(format!("Failed to create directories for {}: {}", path, e));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolOutcome::success(format!("Wrote {} bytes to {}", content.len(), path)),
            Err(e) => ToolOutcome::failure(format!("Failed to write {}: {}", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let temp = tempdir().unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("path".to_string(), Value::from("deep/dir/file.txt"));
        args.insert("content".to_string(), Value::from("data"));

        let out = WriteFileTool.execute(&args, &ctx).await;
        assert!(!out.is_error());
        assert_eq!(std::fs::read_to_string(temp.path().join("deep/dir/file.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn test_write_escape_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("path".to_string(), Value::from("../outside.txt"));
        args.insert("content".to_string(), Value::from("x"));

        let out = WriteFileTool.execute(&args, &ctx).await;
        assert!(out.is_error());
    }
}
