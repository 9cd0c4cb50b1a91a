//! Prompt rendering over Handlebars

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde_json::json;

use crate::tools::ToolSchema;

use super::embedded::{DECISION_GUIDANCE, STEP_PROMPT};

/// Registered prompt templates
pub struct PromptSet {
    handlebars: Handlebars<'static>,
}

impl PromptSet {
    /// Register the embedded templates
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("step", STEP_PROMPT)
            .context("Failed to register step template")?;
        handlebars
            .register_template_string("guidance", DECISION_GUIDANCE)
            .context("Failed to register guidance template")?;
        Ok(Self { handlebars })
    }

    /// The per-step decision prompt
    pub fn render_step(&self, goal: &str, step: u32) -> Result<String> {
        self.handlebars
            .render("step", &json!({ "goal": goal, "step": step }))
            .context("Failed to render step prompt")
    }

    /// Tool guidance for the system side of the conversation
    pub fn render_guidance(&self, tools: &[ToolSchema]) -> Result<String> {
        self.handlebars
            .render("guidance", &json!({ "tools": tools }))
            .context("Failed to render guidance prompt")
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::new().expect("embedded templates are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_prompt_shape() {
        let prompts = PromptSet::new().unwrap();
        let rendered = prompts.render_step("echo hello", 3).unwrap();
        assert_eq!(rendered, "Task goal: echo hello\nCurrent step: 3");
    }

    #[test]
    fn test_guidance_lists_tools() {
        let prompts = PromptSet::new().unwrap();
        let tools = vec![ToolSchema {
            name: "shell".to_string(),
            description: "run commands".to_string(),
            parameters: serde_json::json!({}),
        }];

        let rendered = prompts.render_guidance(&tools).unwrap();
        assert!(rendered.contains("- shell: run commands"));
    }
}
