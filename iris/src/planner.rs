//! Planner - produces intended edits for the PLAN phase
//!
//! The loop asks a planner (an LLM behind the [`Planner`] trait) for a
//! structured JSON plan. Free-text responses fall through to a line-oriented
//! heuristic parser.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::context::IntendedEdit;
use crate::error::IrisError;

/// Source of plan text. Implemented over the model router by callers;
/// the standalone binary and tests use [`EchoPlanner`].
#[async_trait]
pub trait Planner: Send + Sync {
    /// Generate a plan response for the given prompt
    async fn plan(&self, prompt: &str) -> Result<String, IrisError>;
}

/// Planner that returns an empty plan. Useful for dry runs and tests.
pub struct EchoPlanner;

#[async_trait]
impl Planner for EchoPlanner {
    async fn plan(&self, _prompt: &str) -> Result<String, IrisError> {
        Ok("[]".to_string())
    }
}

/// Wire format for one structured edit
#[derive(Debug, Deserialize)]
struct WireEdit {
    file: String,
    start_line: u32,
    end_line: u32,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    new_content: Option<String>,
}

impl From<WireEdit> for IntendedEdit {
    fn from(wire: WireEdit) -> Self {
        IntendedEdit {
            file: wire.file,
            line_range: (wire.start_line, wire.end_line),
            reason: wire.reason,
            original_content: None,
            new_content: wire.new_content,
        }
    }
}

/// Parse a plan response into intended edits.
///
/// Structured JSON (a bare array, a single object, or a fenced ```json
/// block) is authoritative; if none is found, a line-oriented heuristic
/// scans for `edit <file> lines A-B: reason` shapes.
pub fn parse_plan(response: &str) -> Vec<IntendedEdit> {
    if let Some(edits) = parse_structured(response) {
        debug!(count = edits.len(), "Parsed structured plan");
        return edits;
    }

    let edits = parse_heuristic(response);
    debug!(count = edits.len(), "Parsed plan heuristically");
    edits
}

fn parse_structured(response: &str) -> Option<Vec<IntendedEdit>> {
    let candidate = fenced_json(response).unwrap_or(response);

    // Whole payload is an array
    if let Ok(wires) = serde_json::from_str::<Vec<WireEdit>>(candidate.trim()) {
        return Some(wires.into_iter().map(Into::into).collect());
    }

    // Whole payload is a single edit object
    if let Ok(wire) = serde_json::from_str::<WireEdit>(candidate.trim()) {
        return Some(vec![wire.into()]);
    }

    // Embedded array somewhere in surrounding prose
    let start = candidate.find('[')?;
    let end = candidate.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<WireEdit>>(&candidate[start..=end])
        .ok()
        .map(|wires| wires.into_iter().map(Into::into).collect())
}

/// Extract the body of a fenced ```json block, if present
fn fenced_json(response: &str) -> Option<&str> {
    let open = response.find("```json")?;
    let body = &response[open + 7..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn parse_heuristic(response: &str) -> Vec<IntendedEdit> {
    let re = Regex::new(r"(?im)^\W*(?:edit|modify|change)\s+`?([\w./\\-]+)`?\s+lines?\s+(\d+)\s*(?:-|–|to)\s*(\d+)\s*[:(]?\s*(.*?)\)?\s*$")
        .expect("heuristic plan regex is valid");

    re.captures_iter(response)
        .filter_map(|cap| {
            let start: u32 = cap[2].parse().ok()?;
            let end: u32 = cap[3].parse().ok()?;
            Some(IntendedEdit {
                file: cap[1].to_string(),
                line_range: (start, end),
                reason: cap[4].trim().to_string(),
                original_content: None,
                new_content: None,
            })
        })
        .collect()
}

/// Build the planning prompt from the goal and read state
pub fn planning_prompt(goal: &str, files: &[(String, u32)]) -> String {
    let mut listing = String::new();
    for (path, lines) in files {
        listing.push_str(&format!("- {} ({} lines)\n", path, lines));
    }

    format!(
        "Task goal: \"{goal}\"\n\n\
         You have read the following files:\n{listing}\n\
         Plan the minimal set of edits that accomplishes the goal.\n\
         Respond with a JSON array; each element must be an object with keys\n\
         \"file\", \"start_line\", \"end_line\" (1-based inclusive), \"reason\",\n\
         and \"new_content\" (the exact replacement lines).\n\
         Only reference files from the list above."
    )
}

/// Build the focused follow-up prompt for an edit missing its content
pub fn content_prompt(goal: &str, edit: &IntendedEdit) -> String {
    format!(
        "Task goal: \"{goal}\"\n\
         Produce the exact replacement text for {} lines {}-{} ({}).\n\
         Respond with only the new lines, no commentary and no code fences.",
        edit.file, edit.line_range.0, edit.line_range.1, edit.reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let response = r#"[{"file": "src/lib.rs", "start_line": 3, "end_line": 5, "reason": "fix", "new_content": "x"}]"#;
        let edits = parse_plan(response);

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].file, "src/lib.rs");
        assert_eq!(edits[0].line_range, (3, 5));
        assert_eq!(edits[0].new_content.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_fenced_block() {
        let response = "Here is the plan:\n```json\n[{\"file\": \"a.py\", \"start_line\": 1, \"end_line\": 2, \"reason\": \"r\"}]\n```\nDone.";
        let edits = parse_plan(response);

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].file, "a.py");
        assert!(edits[0].new_content.is_none());
    }

    #[test]
    fn test_parse_embedded_array() {
        let response = "I will make two changes. [{\"file\": \"m.rs\", \"start_line\": 10, \"end_line\": 12, \"reason\": \"swap\"}] That is all.";
        let edits = parse_plan(response);

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].line_range, (10, 12));
    }

    #[test]
    fn test_heuristic_fallback() {
        let response = "First, edit src/main.rs lines 4-9: wire the new flag\nThen modify config.yml lines 1 to 3: bump default";
        let edits = parse_plan(response);

        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].file, "src/main.rs");
        assert_eq!(edits[0].line_range, (4, 9));
        assert_eq!(edits[0].reason, "wire the new flag");
        assert_eq!(edits[1].file, "config.yml");
    }

    #[test]
    fn test_unparseable_response_yields_empty_plan() {
        let edits = parse_plan("I think this task is already done, nothing to change.");
        assert!(edits.is_empty());
    }

    #[tokio::test]
    async fn test_echo_planner_empty() {
        let planner = EchoPlanner;
        let response = planner.plan("anything").await.unwrap();
        assert!(parse_plan(&response).is_empty());
    }
}
