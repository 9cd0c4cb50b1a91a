//! Embedded prompt templates
//!
//! Compiled into the binary; the loader registers these with Handlebars.

/// Per-step decision prompt
pub const STEP_PROMPT: &str = "Task goal: {{goal}}\nCurrent step: {{step}}";

/// Guidance appended when tools are available: ask for structured calls
pub const DECISION_GUIDANCE: &str = r#"You may invoke tools by responding with JSON objects, one per line:
{"tool": "<name>", "args": {"<key>": "<value>"}}

Available tools:
{{#each tools}}
- {{this.name}}: {{this.description}}
{{/each}}

Respond with "done" when the goal is satisfied."#;
