//! Skills - higher-level, goal-matching task templates
//!
//! A skill composes tools and model calls for a recognizable class of goal
//! (code review, file organization, ...). Workers consult the registry
//! before falling back to the raw decision-action loop.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Task;
use crate::llm::ModelRouter;
use crate::tools::{ToolInvocationContext, ToolRegistry};

mod builtin;

pub use builtin::{CodeReviewSkill, FileOrganizationSkill};

/// Result of a skill run
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl SkillOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Dependencies a skill may draw on
#[derive(Clone)]
pub struct SkillDeps {
    pub tools: Arc<ToolRegistry>,
    pub router: Arc<ModelRouter>,
    pub tool_ctx: ToolInvocationContext,
}

/// A task template matched against goals
#[async_trait]
pub trait Skill: Send + Sync {
    /// Skill name
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Tools the skill needs available
    fn required_tools(&self) -> &'static [&'static str];

    /// Whether this skill applies to the goal
    fn matches(&self, goal: &str) -> bool;

    /// Run the skill for a task
    async fn execute(&self, task: &Task, deps: &SkillDeps) -> SkillOutcome;
}

/// Registry of skills, matched in registration order
pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
}

impl SkillRegistry {
    /// Registry with the built-in skills
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CodeReviewSkill));
        registry.register(Arc::new(FileOrganizationSkill));
        registry
    }

    /// Empty registry
    pub fn empty() -> Self {
        Self { skills: Vec::new() }
    }

    /// Register a skill
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.push(skill);
    }

    /// All skills
    pub fn list(&self) -> &[Arc<dyn Skill>] {
        &self.skills
    }

    /// Skills matching the goal whose required tools are all available
    pub fn find_matching(&self, goal: &str, available_tools: &HashSet<String>) -> Vec<Arc<dyn Skill>> {
        self.skills
            .iter()
            .filter(|s| s.matches(goal))
            .filter(|s| s.required_tools().iter().all(|t| available_tools.contains(*t)))
            .map(Arc::clone)
            .collect()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
