//! Worker - the decision-action loop
//!
//! A worker drives one task end-to-end: assemble context, consult the
//! router, intercept in-band commands, detect completion, extract and
//! execute tool calls, and append every step to the task. Registries arrive
//! as shared handles at construction.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::commands::{CommandContext, CommandRegistry, StateChange};
use crate::domain::{Profile, Task, TaskStatus};
use crate::llm::{ModelRouter, PromptContext};
use crate::prompts::PromptSet;
use crate::security::{CommandPolicy, Sandbox};
use crate::skills::{SkillDeps, SkillRegistry};
use crate::tools::{ToolInvocationContext, ToolOutcome, ToolRegistry, extract_tool_calls};

/// Markers that signal task completion in model output
const COMPLETE_MARKERS: &[&str] = &["done", "complete", "finished", "success"];

/// Truncation length for free-form action steps
const ACTION_PREVIEW_CHARS: usize = 200;

/// Injected-context entries kept per task
const MAX_INJECTED_CONTEXT: usize = 10;

/// Worker state, visible to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Running,
    Errored,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Shared handles a worker executes against
#[derive(Clone)]
pub struct WorkerDeps {
    pub router: Arc<ModelRouter>,
    pub tools: Arc<ToolRegistry>,
    pub commands: Arc<CommandRegistry>,
    pub skills: Arc<SkillRegistry>,
    pub prompts: Arc<PromptSet>,
    pub profile: Profile,
    pub sandbox: Option<Arc<Sandbox>>,
    pub policy: Option<Arc<CommandPolicy>>,
    pub working_dir: PathBuf,
}

/// Result of running one task
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub success: bool,
    pub steps_completed: u32,
    pub error: Option<String>,
    pub interrupted_by_command: bool,
    pub skill_used: Option<String>,
}

impl TaskOutcome {
    fn ok(steps_completed: u32) -> Self {
        Self {
            success: true,
            steps_completed,
            ..Default::default()
        }
    }

    fn fail(steps_completed: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            steps_completed,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A single decision-action loop executor
pub struct Worker {
    pub id: usize,
    deps: WorkerDeps,
    status: Mutex<WorkerStatus>,
}

impl Worker {
    pub fn new(id: usize, deps: WorkerDeps) -> Self {
        Self {
            id,
            deps,
            status: Mutex::new(WorkerStatus::Idle),
        }
    }

    /// Current worker state
    pub async fn status(&self) -> WorkerStatus {
        *self.status.lock().await
    }

    /// Execute a task to completion (or failure), mutating its step log.
    /// The caller persists the task afterwards.
    pub async fn execute(&self, task: &mut Task) -> TaskOutcome {
        *self.status.lock().await = WorkerStatus::Running;
        info!(worker = self.id, task_id = task.id, "Worker executing task");

        let outcome = self.run_task_loop(task).await;

        *self.status.lock().await = if outcome.success { WorkerStatus::Idle } else { WorkerStatus::Errored };
        outcome
    }

    async fn run_task_loop(&self, task: &mut Task) -> TaskOutcome {
        let profile = &self.deps.profile;

        // Skill dispatch happens before the step loop
        if profile.enable_skills && profile.prefer_skills {
            if let Some(outcome) = self.try_skill(task).await {
                return outcome;
            }
        }

        let mut active_provider: Option<String> = None;
        let mut steps_completed = 0u32;

        while steps_completed < profile.max_steps {
            steps_completed += 1;

            let context = self.assemble_context(task);
            let prompt = match self.deps.prompts.render_step(&task.goal, steps_completed) {
                Ok(p) => p,
                Err(e) => return TaskOutcome::fail(steps_completed, e.to_string()),
            };

            let decision = match self
                .deps
                .router
                .generate(&prompt, &context, active_provider.as_deref())
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    // Provider failure: record the failed step, terminate
                    let msg = e.to_string();
                    task.add_step("error", None, Some(msg.clone()));
                    return TaskOutcome::fail(steps_completed, msg);
                }
            };

            // Command interception comes before everything else
            let command_ctx = CommandContext {
                task: task.clone(),
                router: Arc::clone(&self.deps.router),
                tools: Arc::clone(&self.deps.tools),
                skills: Arc::clone(&self.deps.skills),
            };
            if profile.enable_commands {
                if let Some(result) = self.deps.commands.execute_command(&decision, &command_ctx).await {
                    task.add_step("command", Some(result.output.clone()), None);
                    self.apply_state_changes(task, &result.state_changes, &mut active_provider);

                    if result.interrupt_execution {
                        return TaskOutcome {
                            interrupted_by_command: true,
                            ..TaskOutcome::ok(steps_completed)
                        };
                    }
                    continue;
                }
            }

            task.add_step("decision", Some(decision.clone()), None);

            if is_complete(&decision) {
                debug!(task_id = task.id, step = steps_completed, "Completion detected");
                return TaskOutcome::ok(steps_completed);
            }

            let tool_calls = extract_tool_calls(&decision);
            if tool_calls.is_empty() {
                let preview: String = decision.chars().take(ACTION_PREVIEW_CHARS).collect();
                task.add_step("action", Some(preview), None);
                continue;
            }

            for call in tool_calls.iter().take(profile.max_tools_per_step) {
                let outcome = self.execute_tool(&call.tool, &call.args).await;
                let error = (!outcome.error.is_empty()).then(|| outcome.error.clone());
                task.add_step("action", Some(outcome.output.clone()), error);

                if outcome.is_error() {
                    return TaskOutcome::fail(steps_completed, format!("Tool failed: {}", outcome.error));
                }
            }
        }

        // Exhausting the step budget counts as satisfied: bounded progress
        TaskOutcome::ok(steps_completed)
    }

    /// Run the first matching skill, if any
    async fn try_skill(&self, task: &mut Task) -> Option<TaskOutcome> {
        let available: HashSet<String> = self.deps.tools.names().into_iter().collect();
        let matching = self.deps.skills.find_matching(&task.goal, &available);
        let skill = matching.first()?;

        info!(worker = self.id, task_id = task.id, skill = skill.name(), "Dispatching to skill");

        let deps = SkillDeps {
            tools: Arc::clone(&self.deps.tools),
            router: Arc::clone(&self.deps.router),
            tool_ctx: self.tool_ctx(),
        };
        let result = skill.execute(task, &deps).await;
        task.add_step("skill", Some(format!("Used skill: {}", skill.name())), result.error.clone());

        Some(TaskOutcome {
            success: result.success,
            steps_completed: 1,
            error: result.error,
            interrupted_by_command: false,
            skill_used: Some(skill.name().to_string()),
        })
    }

    fn assemble_context(&self, task: &Task) -> PromptContext {
        PromptContext {
            task_id: Some(task.id),
            task_goal: Some(task.goal.clone()),
            status: Some(task.status.to_string()),
            recent_steps: task
                .last_steps(3)
                .iter()
                .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                .collect(),
            available_tools: self
                .deps
                .tools
                .schemas()
                .into_iter()
                .map(|s| serde_json::to_value(&s).unwrap_or(Value::Null))
                .collect(),
        }
    }

    fn tool_ctx(&self) -> ToolInvocationContext {
        ToolInvocationContext::new(&self.deps.working_dir)
            .with_security(self.deps.sandbox.clone(), self.deps.policy.clone())
    }

    async fn execute_tool(&self, name: &str, args: &serde_json::Map<String, Value>) -> ToolOutcome {
        let Some(tool) = self.deps.tools.get(name) else {
            return ToolOutcome::failure(format!("Tool not found: {}", name));
        };
        tool.execute(args, &self.tool_ctx()).await
    }

    /// Apply tagged state-change intents from a command
    fn apply_state_changes(&self, task: &mut Task, changes: &[StateChange], active_provider: &mut Option<String>) {
        for change in changes {
            match change {
                StateChange::SwitchProvider(name) => {
                    task.add_step("state_change", Some(format!("Switched provider to: {}", name)), None);
                    *active_provider = Some(name.clone());
                }
                StateChange::Pause => {
                    if let Err(e) = task.set_status(TaskStatus::Paused) {
                        warn!(task_id = task.id, error = %e, "Pause rejected");
                    }
                }
                StateChange::Resume => {
                    if task.status == TaskStatus::Paused {
                        if let Err(e) = task.set_status(TaskStatus::Running) {
                            warn!(task_id = task.id, error = %e, "Resume rejected");
                        }
                    }
                }
                StateChange::InjectContext(text) => {
                    let entry = serde_json::json!({
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                        "context": text,
                    });
                    let list = task
                        .memory
                        .entry("injected_context".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = list {
                        items.push(entry);
                        if items.len() > MAX_INJECTED_CONTEXT {
                            let excess = items.len() - MAX_INJECTED_CONTEXT;
                            items.drain(..excess);
                        }
                    }
                }
            }
        }
    }
}

/// Case-insensitive completion marker check
fn is_complete(decision: &str) -> bool {
    let lower = decision.to_lowercase();
    COMPLETE_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AuthType, MetricsLedger, Provider, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Provider that returns scripted responses in order, then "all done"
    struct ScriptedProvider {
        responses: Vec<String>,
        cursor: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|s| s.to_string()).collect(),
                cursor: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, _prompt: &str, _context: &PromptContext) -> Result<String, ProviderError> {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "all done".to_string()))
        }

        fn auth_type(&self) -> AuthType {
            AuthType::ApiKey
        }
    }

    fn worker_for(dir: &std::path::Path, responses: &[&str]) -> Worker {
        let metrics = Arc::new(MetricsLedger::open(dir.join("metrics.json")).unwrap());
        let mut router = crate::llm::ModelRouter::bare(metrics, None, None);
        router.register("scripted", Arc::new(ScriptedProvider::new(responses)));
        router.set_default("scripted").unwrap();

        Worker::new(
            0,
            WorkerDeps {
                router: Arc::new(router),
                tools: Arc::new(ToolRegistry::standard()),
                commands: Arc::new(CommandRegistry::standard()),
                skills: Arc::new(SkillRegistry::empty()),
                prompts: Arc::new(PromptSet::new().unwrap()),
                profile: Profile::balanced(),
                sandbox: None,
                policy: None,
                working_dir: dir.to_path_buf(),
            },
        )
    }

    fn running_task(goal: &str) -> Task {
        let mut task = Task::new(1, goal);
        task.set_status(TaskStatus::Running).unwrap();
        task
    }

    #[tokio::test]
    async fn test_completion_detected_first_step() {
        let temp = tempdir().unwrap();
        let worker = worker_for(temp.path(), &["All done."]);
        let mut task = running_task("simple goal");

        let outcome = worker.execute(&mut task).await;
        assert!(outcome.success);
        assert_eq!(outcome.steps_completed, 1);

        // Exactly one decision step
        let decisions: Vec<_> = task.steps.iter().filter(|s| s.action == "decision").collect();
        assert_eq!(decisions.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_executed_and_logged() {
        let temp = tempdir().unwrap();
        let worker = worker_for(temp.path(), &["action shell(command=\"echo hello\")", "all done"]);
        let mut task = running_task("run echo");

        let outcome = worker.execute(&mut task).await;
        assert!(outcome.success);

        let action = task
            .steps
            .iter()
            .find(|s| s.action == "action" && s.result.as_deref().map(|r| r.contains("hello")).unwrap_or(false));
        assert!(action.is_some(), "expected an action step containing tool output");
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_with_prefix() {
        let temp = tempdir().unwrap();
        let worker = worker_for(temp.path(), &["bogus(x=1)"]);
        let mut task = running_task("call a ghost");

        let outcome = worker.execute(&mut task).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Tool failed: Tool not found: bogus"));
    }

    #[tokio::test]
    async fn test_pause_command_interrupts() {
        let temp = tempdir().unwrap();
        let worker = worker_for(temp.path(), &["I think we should /pause here"]);
        let mut task = running_task("pausable goal");

        let outcome = worker.execute(&mut task).await;
        assert!(outcome.success);
        assert!(outcome.interrupted_by_command);
        assert_eq!(task.status, TaskStatus::Paused);
        assert!(task.steps.iter().any(|s| s.action == "command"));
    }

    #[tokio::test]
    async fn test_no_tools_logs_truncated_action() {
        let temp = tempdir().unwrap();
        let long_musing = "thinking ".repeat(60);
        let worker = worker_for(temp.path(), &[&long_musing, "all done"]);
        let mut task = running_task("ponder");

        let outcome = worker.execute(&mut task).await;
        assert!(outcome.success);

        let action = task.steps.iter().find(|s| s.action == "action").unwrap();
        assert_eq!(action.result.as_ref().unwrap().chars().count(), ACTION_PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn test_max_steps_reached_is_success() {
        let temp = tempdir().unwrap();
        // Never completes, never calls tools
        let responses: Vec<String> = (0..20).map(|n| format!("still working, iteration {}", n)).collect();
        let refs: Vec<&str> = responses.iter().map(|s| s.as_str()).collect();
        let worker = worker_for(temp.path(), &refs);
        let mut task = running_task("endless pondering");

        let outcome = worker.execute(&mut task).await;
        assert!(outcome.success);
        assert_eq!(outcome.steps_completed, Profile::balanced().max_steps);
    }

    #[tokio::test]
    async fn test_inject_context_caps_entries() {
        let temp = tempdir().unwrap();
        let worker = worker_for(temp.path(), &[]);
        let mut task = running_task("memory");

        let changes: Vec<StateChange> = (0..15).map(|n| StateChange::InjectContext(format!("fact {}", n))).collect();
        let mut active = None;
        worker.apply_state_changes(&mut task, &changes, &mut active);

        let items = task.memory["injected_context"].as_array().unwrap();
        assert_eq!(items.len(), MAX_INJECTED_CONTEXT);
        assert_eq!(items[0]["context"], "fact 5");
    }
}
