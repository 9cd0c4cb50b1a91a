//! Grep tool - regex search across files in the working directory

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use walkdir::WalkDir;

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

const MAX_RESULTS: usize = 50;

/// Search file contents for a regex pattern
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search files for a regex pattern. Returns path:line matches, capped at 50 results."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: '.')"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let Some(pattern) = arg_str(args, "pattern") else {
            return ToolOutcome::failure("grep requires a 'pattern' argument");
        };
        let path = arg_str(args, "path").unwrap_or(".");
        let case_insensitive = args.get("case_insensitive").and_then(|v| v.as_bool()).unwrap_or(false);

        let regex = match regex::RegexBuilder::new(pattern).case_insensitive(case_insensitive).build() {
            Ok(re) => re,
            Err(e) => return ToolOutcome::failure(format!("Invalid pattern: {}", e)),
        };

        let root = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::failure(e),
        };

        let mut matches = Vec::new();

        'outer: for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .flatten()
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };

            let display = entry.path().strip_prefix(&root).unwrap_or(entry.path()).display().to_string();
            for (lnum, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}: {}", display, lnum + 1, line.trim_end()));
                    if matches.len() >= MAX_RESULTS {
                        break 'outer;
                    }
                }
            }
        }

        if matches.is_empty() {
            ToolOutcome::success(format!("No matches for '{}'", pattern))
        } else {
            ToolOutcome::success(matches.join("\n"))
        }
    }
}
