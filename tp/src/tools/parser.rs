//! Tool-call extraction from model output
//!
//! Providers are asked for structured JSON tool calls
//! (`{"tool": "shell", "args": {...}}`, single or array, fenced or raw);
//! free-form text falls back to the `name(key=value, ...)` heuristic.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// One extracted tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub tool: String,
    pub args: Map<String, Value>,
}

#[derive(Deserialize)]
struct WireCall {
    tool: String,
    #[serde(default)]
    args: Map<String, Value>,
}

impl From<WireCall> for ParsedToolCall {
    fn from(wire: WireCall) -> Self {
        Self {
            tool: wire.tool,
            args: wire.args,
        }
    }
}

/// Extract tool calls from model output, structured JSON first
pub fn extract_tool_calls(text: &str) -> Vec<ParsedToolCall> {
    if let Some(calls) = extract_structured(text) {
        if !calls.is_empty() {
            debug!(count = calls.len(), "Extracted structured tool calls");
            return calls;
        }
    }

    let calls = extract_heuristic(text);
    debug!(count = calls.len(), "Extracted tool calls heuristically");
    calls
}

fn extract_structured(text: &str) -> Option<Vec<ParsedToolCall>> {
    let candidate = fenced_json(text).unwrap_or(text).trim();

    if let Ok(wires) = serde_json::from_str::<Vec<WireCall>>(candidate) {
        return Some(wires.into_iter().map(Into::into).collect());
    }
    if let Ok(wire) = serde_json::from_str::<WireCall>(candidate) {
        return Some(vec![wire.into()]);
    }

    // Line-oriented: any line that is a JSON tool-call object
    let calls: Vec<ParsedToolCall> = text
        .lines()
        .filter_map(|line| serde_json::from_str::<WireCall>(line.trim()).ok())
        .map(Into::into)
        .collect();

    (!calls.is_empty()).then_some(calls)
}

fn fenced_json(text: &str) -> Option<&str> {
    let open = text.find("```json")?;
    let body = &text[open + 7..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// The legacy pattern: `name(arg=value, other="quoted")`
fn extract_heuristic(text: &str) -> Vec<ParsedToolCall> {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    let re = CALL_RE.get_or_init(|| Regex::new(r"(\w+)\(([^)]*)\)").expect("tool call regex is valid"));

    re.captures_iter(text)
        .map(|cap| {
            let mut args = Map::new();
            for pair in cap[2].split(',') {
                if let Some((key, value)) = pair.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    args.insert(key.trim().to_string(), Value::from(value));
                }
            }
            ParsedToolCall {
                tool: cap[1].to_string(),
                args,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_single_call() {
        let calls = extract_tool_calls("I will run shell(command=\"echo hello\") now");

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "shell");
        assert_eq!(calls[0].args["command"], "echo hello");
    }

    #[test]
    fn test_heuristic_multiple_args() {
        let calls = extract_tool_calls("write_file(path=out.txt, content=\"data\")");

        assert_eq!(calls[0].args["path"], "out.txt");
        assert_eq!(calls[0].args["content"], "data");
    }

    #[test]
    fn test_heuristic_empty_args() {
        let calls = extract_tool_calls("list_dir()");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.is_empty());
    }

    #[test]
    fn test_structured_object() {
        let calls = extract_tool_calls(r#"{"tool": "shell", "args": {"command": "ls -la"}}"#);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "shell");
        assert_eq!(calls[0].args["command"], "ls -la");
    }

    #[test]
    fn test_structured_array_in_fence() {
        let text = "Running tools:\n```json\n[{\"tool\": \"read_file\", \"args\": {\"path\": \"a.txt\"}}, {\"tool\": \"list_dir\"}]\n```";
        let calls = extract_tool_calls(text);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool, "read_file");
        assert_eq!(calls[1].tool, "list_dir");
        assert!(calls[1].args.is_empty());
    }

    #[test]
    fn test_structured_line_oriented() {
        let text = "thinking...\n{\"tool\": \"shell\", \"args\": {\"command\": \"pwd\"}}\nmore thoughts";
        let calls = extract_tool_calls(text);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["command"], "pwd");
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        assert!(extract_tool_calls("The task is progressing nicely.").is_empty());
    }

    #[test]
    fn test_structured_preferred_over_heuristic() {
        // The JSON form must win even when prose also matches the regex
        let text = "call shell(command=wrong)\n{\"tool\": \"shell\", \"args\": {\"command\": \"right\"}}";
        let calls = extract_tool_calls(text);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["command"], "right");
    }
}
