//! Glob tool - find files matching a pattern

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

/// Find files matching a glob pattern
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern (e.g., **/*.rs) under the working directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let Some(pattern) = arg_str(args, "pattern") else {
            return ToolOutcome::failure("glob requires a 'pattern' argument");
        };

        let root = ctx.working_dir.canonicalize().unwrap_or_else(|_| ctx.working_dir.clone());
        let full_pattern = root.join(pattern);
        let Some(pattern_str) = full_pattern.to_str() else {
            return ToolOutcome::failure("Invalid pattern path");
        };

        let paths = match glob::glob(pattern_str) {
            Ok(paths) => paths,
            Err(e) => return ToolOutcome::failure(format!("Invalid glob pattern: {}", e)),
        };

        let mut matches: Vec<String> = paths
            .filter_map(|r| r.ok())
            .filter(|p| p.starts_with(&root))
            .filter_map(|p| p.strip_prefix(&root).ok().map(|rel| rel.display().to_string()))
            .collect();
        matches.sort();

        if matches.is_empty() {
            ToolOutcome::success(format!("No files match '{}'", pattern))
        } else {
            ToolOutcome::success(matches.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_glob_matches_extension() {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/a.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/b.txt"), "").unwrap();

        let ctx = ToolInvocationContext::new(temp.path());
        let mut args = Map::new();
        args.insert("pattern".to_string(), Value::from("**/*.rs"));

        let out = GlobTool.execute(&args, &ctx).await;
        assert!(out.output.contains("src/a.rs"));
        assert!(!out.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_no_matches_is_success() {
        let temp = tempdir().unwrap();
        let ctx = ToolInvocationContext::new(temp.path());

        let mut args = Map::new();
        args.insert("pattern".to_string(), Value::from("*.zig"));

        let out = GlobTool.execute(&args, &ctx).await;
        assert!(!out.is_error());
        assert!(out.output.contains("No files match"));
    }
}
