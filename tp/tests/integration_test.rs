//! Integration tests for TaskPilot
//!
//! End-to-end scenarios through the supervisor, router, and IRIS loop.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use taskpilot::commands::CommandRegistry;
use taskpilot::domain::{CollaborationMode, Profile, TaskStatus};
use taskpilot::llm::{AuthType, MetricsLedger, ModelRouter, PromptContext, Provider, ProviderError, RouterPolicy};
use taskpilot::plugins::PluginRegistry;
use taskpilot::prompts::PromptSet;
use taskpilot::remote::NodeRegistry;
use taskpilot::repo::TaskRepository;
use taskpilot::skills::SkillRegistry;
use taskpilot::supervisor::{Supervisor, SupervisorConfig};
use taskpilot::tools::ToolRegistry;
use taskpilot::worker::WorkerDeps;

// =============================================================================
// Test providers
// =============================================================================

/// Returns scripted responses in order, then "all done" forever
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

/// Sleeps briefly and completes, tracking peak concurrency
struct SlowProvider {
    current: Arc<AtomicI64>,
    peak: Arc<AtomicI64>,
}

#[async_trait]
impl Provider for SlowProvider {
    async fn generate(&self, _prompt: &str, _context: &PromptContext) -> Result<String, ProviderError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok("task complete".to_string())
    }

    fn auth_type(&self) -> AuthType {
        AuthType::ApiKey
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Stack {
    repo: Arc<TaskRepository>,
    supervisor: Arc<Supervisor>,
}

fn build_stack(dir: &Path, provider: Arc<dyn Provider>, profile: Profile, max_workers: usize) -> Stack {
    let metrics = Arc::new(MetricsLedger::open(dir.join("metrics.json")).unwrap());
    let mut router = ModelRouter::bare(Arc::clone(&metrics), None, None);
    router.register("test", provider);
    router.set_default("test").unwrap();

    let repo = Arc::new(TaskRepository::open(dir.join("tasks.json")).unwrap());
    let nodes = Arc::new(NodeRegistry::open(dir.join("nodes.json")).unwrap());
    let plugins = Arc::new(PluginRegistry::open(dir.join("plugins.json")).unwrap());

    let deps = WorkerDeps {
        router: Arc::new(router),
        tools: Arc::new(ToolRegistry::standard()),
        commands: Arc::new(CommandRegistry::standard()),
        skills: Arc::new(SkillRegistry::empty()),
        prompts: Arc::new(PromptSet::new().unwrap()),
        profile,
        sandbox: None,
        policy: None,
        working_dir: dir.to_path_buf(),
    };

    let config = SupervisorConfig {
        max_workers,
        run_all_timeout_secs: 30,
        ..Default::default()
    };

    let supervisor = Arc::new(Supervisor::new(config, deps, Arc::clone(&repo), nodes, plugins));

    Stack { repo, supervisor }
}

// =============================================================================
// Decision-action loop scenarios
// =============================================================================

#[tokio::test]
async fn test_bounded_loop_executes_tool() {
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["action shell(command=\"echo hello\")", "all done"]));
    let stack = build_stack(temp.path(), provider, Profile::balanced(), 1);

    stack.repo.create("echo hello").await.unwrap();

    stack.supervisor.start().await;
    let summary = stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.completed, 1);

    let task = stack.repo.get(1).await.unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert!(!task.steps.is_empty());

    let tool_output = task
        .steps
        .iter()
        .find(|s| s.action == "action" && s.result.as_deref().map(|r| r.contains("hello")).unwrap_or(false));
    assert!(tool_output.is_some(), "expected an action step with tool output containing 'hello'");
}

#[tokio::test]
async fn test_completion_detection_first_step() {
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["All done."]));
    let stack = build_stack(temp.path(), provider, Profile::balanced(), 1);

    stack.repo.create("trivial goal").await.unwrap();

    stack.supervisor.start().await;
    stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    let task = stack.repo.get(1).await.unwrap();
    assert_eq!(task.status, TaskStatus::Done);

    let decisions: Vec<_> = task.steps.iter().filter(|s| s.action == "decision").collect();
    assert_eq!(decisions.len(), 1, "loop must exit on the first decision");
}

#[tokio::test]
async fn test_unknown_tool_fails_task() {
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["bogus(x=1)"]));
    let stack = build_stack(temp.path(), provider, Profile::balanced(), 1);

    stack.repo.create("call a missing tool").await.unwrap();

    stack.supervisor.start().await;
    let summary = stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    assert_eq!(summary.failed, 1);

    let task = stack.repo.get(1).await.unwrap();
    assert_eq!(task.status, TaskStatus::Error);

    let failed_step = task.steps.iter().find(|s| s.error.is_some()).unwrap();
    assert_eq!(failed_step.error.as_deref(), Some("Tool not found: bogus"));
}

// =============================================================================
// Routing scenarios
// =============================================================================

#[tokio::test]
async fn test_rate_limited_provider_routed_around() {
    let temp = tempdir().unwrap();
    let metrics = Arc::new(MetricsLedger::open(temp.path().join("metrics.json")).unwrap());

    let mut router = ModelRouter::bare(
        Arc::clone(&metrics),
        Some(RouterPolicy::new(Arc::clone(&metrics))),
        None,
    );
    router.register("a", Arc::new(ScriptedProvider::new(&[])));
    router.register("b", Arc::new(ScriptedProvider::new(&[])));

    // Put A into a one-minute cooldown
    metrics.mark_rate_limited("a", 60).await.unwrap();

    router.generate("pick one", &PromptContext::default(), None).await.unwrap();

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.get("b").map(|m| m.total_requests), Some(1));
    assert!(snapshot.get("a").map(|m| m.total_requests == 0).unwrap_or(true));
}

// =============================================================================
// IRIS scenarios
// =============================================================================

struct PlanOnly(String);

#[async_trait]
impl iris::Planner for PlanOnly {
    async fn plan(&self, _prompt: &str) -> Result<String, iris::IrisError> {
        Ok(self.0.clone())
    }
}

fn plan_json(file: &str, start: u32, end: u32, content: &str) -> String {
    serde_json::json!([{
        "file": file,
        "start_line": start,
        "end_line": end,
        "reason": "integration",
        "new_content": content,
    }])
    .to_string()
}

async fn trusted_agent(root: &Path, plan: String) -> iris::AgentLoop {
    let agent = iris::AgentLoop::new(root, Arc::new(PlanOnly(plan)), Arc::new(iris::AutoApprove)).unwrap();
    agent.context_manager().initialize("integration").unwrap();
    agent
        .context_manager()
        .update_context(|ctx| ctx.policy.trusted_workspace = true)
        .unwrap();
    agent
}

#[tokio::test]
async fn test_iris_enforcement_blocks_unread_write() {
    let temp = tempdir().unwrap();
    std::fs::write(temp.path().join("main.py"), "print('x')\n").unwrap();
    let untouched = temp.path().join("settings.cfg");
    std::fs::write(&untouched, "keep = true\n").unwrap();

    // The plan targets a file the READ phase never recorded
    let agent = trusted_agent(temp.path(), plan_json("settings.cfg", 1, 1, "keep = false")).await;
    let err = agent.execute("11", "flip the setting").await.unwrap_err();

    assert!(err.is_enforcement_violation());
    assert!(err.to_string().starts_with("ERR_ENFORCEMENT_VIOLATION"));
    assert_eq!(std::fs::read_to_string(&untouched).unwrap(), "keep = true\n");

    let ctx = agent.context_manager().load_context().unwrap();
    assert_eq!(ctx.current_task.unwrap().status, iris::TaskState::Error);
}

#[tokio::test]
async fn test_iris_rollback_on_verify_failure() {
    let temp = tempdir().unwrap();
    let target = temp.path().join("config.json");
    let original = "{\"port\": 8080}\n";
    std::fs::write(&target, original).unwrap();

    let agent = iris::AgentLoop::with_config(
        temp.path(),
        Arc::new(PlanOnly(plan_json("config.json", 1, 1, "{broken"))),
        Arc::new(iris::AutoApprove),
        iris::LoopConfig {
            source_ext: Some("json".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    agent.context_manager().initialize("integration").unwrap();
    agent
        .context_manager()
        .update_context(|ctx| ctx.policy.trusted_workspace = true)
        .unwrap();

    let err = agent.execute("12", "break the config").await.unwrap_err();
    assert!(matches!(err, iris::IrisError::VerifyFailed { .. }));

    // Byte-exact rollback; checkpoint retained
    assert_eq!(std::fs::read_to_string(&target).unwrap(), original);

    let checkpoint_root = temp.path().join(".context/checkpoints/12");
    let checkpoints: Vec<_> = std::fs::read_dir(&checkpoint_root).unwrap().flatten().collect();
    assert_eq!(checkpoints.len(), 1);
    let name = checkpoints[0].file_name().to_string_lossy().to_string();
    assert!(name.starts_with("config.json.orig."));
}

// =============================================================================
// Supervisor concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_pool_bounds_and_drains() {
    let temp = tempdir().unwrap();
    let current = Arc::new(AtomicI64::new(0));
    let peak = Arc::new(AtomicI64::new(0));

    let provider = Arc::new(SlowProvider {
        current: Arc::clone(&current),
        peak: Arc::clone(&peak),
    });
    let stack = build_stack(temp.path(), provider, Profile::balanced(), 3);

    for n in 0..5 {
        stack.repo.create(format!("parallel goal {}", n)).await.unwrap();
    }

    stack.supervisor.start().await;
    let summary = stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    assert_eq!(summary.total, 5);
    assert_eq!(summary.completed + summary.failed, 5);
    assert_eq!(summary.queued, 0);

    for task in stack.repo.list_all().await {
        assert!(task.status.is_terminal(), "task {} not terminal: {}", task.id, task.status);
    }

    // Pool of 3 never exceeds 3 in-flight provider calls
    assert!(peak.load(Ordering::SeqCst) <= 3, "peak concurrency was {}", peak.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cooperative_decomposition_spawns_subtasks() {
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&[]));

    let profile = Profile::custom("coop", "cooperative test")
        .collaboration_mode(CollaborationMode::Cooperative)
        .task_decomposition(true)
        .build()
        .unwrap();

    let stack = build_stack(temp.path(), provider, profile, 2);
    let parent = stack.repo.create("write the report and send it").await.unwrap();

    stack.supervisor.start().await;
    stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    let parent = stack.repo.get(parent.id).await.unwrap();
    assert_eq!(parent.status, TaskStatus::Done);
    assert!(parent.steps.iter().any(|s| s.action == "decomposed"));

    let children = stack.supervisor.subtasks_of(parent.id).await;
    assert_eq!(children.len(), 2);
    for id in children {
        let child = stack.repo.get(id).await.unwrap();
        assert_eq!(child.status, TaskStatus::Done, "subtask {} should complete", id);
    }
}

#[tokio::test]
async fn test_competitive_race_first_success_wins() {
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&[]));

    let profile = Profile::custom("racer", "competitive test")
        .collaboration_mode(CollaborationMode::Competitive)
        .build()
        .unwrap();

    let stack = build_stack(temp.path(), provider, profile, 2);
    let task = stack.repo.create("race to the answer").await.unwrap();

    stack.supervisor.start().await;
    let summary = stack.supervisor.run_all_pending().await;
    stack.supervisor.shutdown().await;

    assert_eq!(summary.completed, 1);

    let task = stack.repo.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    // Winner's decision step merged back into the parent record
    assert!(task.steps.iter().any(|s| s.action == "decision"));
}
