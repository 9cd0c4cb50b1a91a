//! List directory tool

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

/// List directory entries
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &'static str {
        "list_dir"
    }

    fn description(&self) -> &'static str {
        "List entries in a directory (defaults to the working directory)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: '.')"
                }
            }
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let path = arg_str(args, "path").unwrap_or(".");

        let resolved = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::failure(e),
        };

        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutcome::failure(format!("Failed to list {}: {}", path, e)),
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let suffix = if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) { "/" } else { "" };
            names.push(format!("{}{}", entry.file_name().to_string_lossy(), suffix));
        }
        names.sort();

        ToolOutcome::success(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_lists_files_and_dirs() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let ctx = ToolInvocationContext::new(temp.path());
        let out = ListDirTool.execute(&Map::new(), &ctx).await;

        assert!(out.output.contains("a.txt"));
        assert!(out.output.contains("sub/"));
    }

    #[tokio::test]
    async fn test_missing_dir_fails() {
        let temp = tempdir().unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("path".to_string(), Value::from("ghost"));

        let out = ListDirTool.execute(&args, &ctx).await;
        assert!(out.is_error());
    }
}
