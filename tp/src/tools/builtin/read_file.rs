//! Read file tool

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

/// Read a file's contents
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file relative to the working directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let Some(path) = arg_str(args, "path") else {
            return ToolOutcome::failure("read_file requires a 'path' argument");
        };

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::failure(e),
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => ToolOutcome::success(content),
            Err(e) => ToolOutcome::failure(format!("Failed to read {}: {}", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_existing_file() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("hello.txt"), "contents here").unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("path".to_string(), Value::from("hello.txt"));

        let out = ReadFileTool.execute(&args, &ctx).await;
        assert_eq!(out.output, "contents here");
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let temp = tempdir().unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("path".to_string(), Value::from("nope.txt"));

        let out = ReadFileTool.execute(&args, &ctx).await;
        assert!(out.is_error());
    }
}
