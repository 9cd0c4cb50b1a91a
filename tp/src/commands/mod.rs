//! In-band command interception
//!
//! Model output is scanned for command triggers (`/pause`, `/switch model
//! openai`, ...); the first matching command executes and returns a
//! [`CommandResult`] whose `state_changes` are tagged intents the worker
//! pattern-matches and applies.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::Task;
use crate::llm::ModelRouter;
use crate::skills::SkillRegistry;
use crate::tools::ToolRegistry;

mod builtin;

pub use builtin::{
    AuthStatusCommand, InjectContextCommand, InspectTaskCommand, PauseCommand, ResumeCommand, SwitchModelCommand,
};

/// A state mutation requested by a command
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// Pin subsequent generation calls to this provider
    SwitchProvider(String),
    /// Pause the task
    Pause,
    /// Resume the task
    Resume,
    /// Append text to the task's injected context memory
    InjectContext(String),
}

/// Result of executing a command
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    pub state_changes: Vec<StateChange>,
    pub interrupt_execution: bool,
}

impl CommandResult {
    /// Successful result with output only
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    /// Failed result
    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            ..Default::default()
        }
    }

    /// Attach state changes
    pub fn with_changes(mut self, changes: Vec<StateChange>) -> Self {
        self.state_changes = changes;
        self
    }

    /// Mark the command as interrupting the step loop
    pub fn interrupting(mut self) -> Self {
        self.interrupt_execution = true;
        self
    }
}

/// Execution context handed to commands
#[derive(Clone)]
pub struct CommandContext {
    /// Snapshot of the task being executed
    pub task: Task,
    pub router: Arc<ModelRouter>,
    pub tools: Arc<ToolRegistry>,
    pub skills: Arc<SkillRegistry>,
}

/// An in-band directive parsed from model output
#[async_trait]
pub trait Command: Send + Sync {
    /// Command name
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Lowercase substring triggers
    fn triggers(&self) -> &'static [&'static str];

    /// Whether any trigger appears in the text (case-insensitive)
    fn can_handle(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.triggers().iter().any(|t| lower.contains(t))
    }

    /// Parse command arguments from the text
    fn parse_args(&self, _text: &str) -> Map<String, Value> {
        Map::new()
    }

    /// Execute with context and parsed arguments
    async fn execute(&self, ctx: &CommandContext, args: &Map<String, Value>) -> CommandResult;
}

/// Registry of commands, matched in insertion order
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Registry with the built-in commands
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AuthStatusCommand));
        registry.register(Arc::new(SwitchModelCommand));
        registry.register(Arc::new(PauseCommand));
        registry.register(Arc::new(ResumeCommand));
        registry.register(Arc::new(InspectTaskCommand));
        registry.register(Arc::new(InjectContextCommand));
        registry
    }

    /// Empty registry (for testing)
    pub fn empty() -> Self {
        Self { commands: Vec::new() }
    }

    /// Register a command
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.push(command);
    }

    /// All registered commands
    pub fn list(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    /// First command (insertion order) whose trigger appears in the text
    pub fn find_command_for_text(&self, text: &str) -> Option<Arc<dyn Command>> {
        self.commands.iter().find(|c| c.can_handle(text)).map(Arc::clone)
    }

    /// Execute the matching command, if any
    pub async fn execute_command(&self, text: &str, ctx: &CommandContext) -> Option<CommandResult> {
        let command = self.find_command_for_text(text)?;
        debug!(command = command.name(), "Intercepted command");

        let args = command.parse_args(text);
        Some(command.execute(ctx, &args).await)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
