//! Engine - constructs the object graph and drives task execution
//!
//! Subsystems come up in dependency order (auth before model systems,
//! tools before plugins, security before the supervisor) and are shared as
//! handles. The engine backs every CLI operation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::{Result, eyre};
use tracing::{info, warn};

use crate::auth::{AccountManager, AccountRotator, AuthSessionStore};
use crate::config::Config;
use crate::domain::{Priority, Profile, ProfileRegistry, Task, TaskStatus};
use crate::iris_bridge::{RouterPlanner, is_iris_task, mark_iris_task};
use crate::llm::{MetricsLedger, ModelRouter, OpenAiConfig, OpenAiProvider, RouterPolicy};
use crate::plugins::PluginRegistry;
use crate::prompts::PromptSet;
use crate::remote::NodeRegistry;
use crate::repo::TaskRepository;
use crate::security::{CommandPolicy, Sandbox, SandboxLimits};
use crate::skills::SkillRegistry;
use crate::supervisor::{RunSummary, Supervisor};
use crate::tools::ToolRegistry;
use crate::worker::WorkerDeps;

/// Poll interval while waiting on task completion
const WAIT_POLL: Duration = Duration::from_millis(100);

/// The assembled system
pub struct Engine {
    pub config: Config,
    pub repo: Arc<TaskRepository>,
    pub metrics: Arc<MetricsLedger>,
    pub accounts: Arc<AccountManager>,
    pub rotator: Arc<AccountRotator>,
    pub sessions: Arc<AuthSessionStore>,
    pub router: Arc<ModelRouter>,
    pub nodes: Arc<NodeRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub skills: Arc<SkillRegistry>,
    pub plugins: Arc<PluginRegistry>,
    pub profile: Profile,
    pub sandbox: Option<Arc<Sandbox>>,
    pub policy: Option<Arc<CommandPolicy>>,
    pub supervisor: Arc<Supervisor>,
}

impl Engine {
    /// Build every subsystem from configuration
    pub fn bootstrap(config: Config) -> Result<Self> {
        let storage = &config.storage;

        // Auth systems come before model systems
        let accounts = Arc::new(AccountManager::open(storage.state_file("accounts.json"))?);
        let rotator = Arc::new(AccountRotator::new(Arc::clone(&accounts)));
        let sessions = Arc::new(AuthSessionStore::open(storage.state_file("auth_sessions.json"))?);

        // Model routing
        let metrics = Arc::new(MetricsLedger::open(storage.state_file("model_metrics.json"))?);
        let router_policy = RouterPolicy::new(Arc::clone(&metrics));
        let mut router = ModelRouter::new(Arc::clone(&metrics), Some(router_policy), Some(Arc::clone(&rotator)));

        let openai = OpenAiProvider::new(OpenAiConfig {
            model: config.llm.model.clone(),
            base_url: config.llm.base_url.clone(),
            api_key_env: config.llm.api_key_env.clone(),
            timeout: config.llm.timeout(),
            max_tokens: config.llm.max_tokens,
        })?;
        router.register("openai", Arc::new(openai));

        if let Some(name) = &config.llm.provider {
            router.set_default(name).map_err(|e| eyre!(e.to_string()))?;
        }
        let router = Arc::new(router);

        // Remote, tools, plugins, skills
        let nodes = Arc::new(NodeRegistry::open(storage.state_file("nodes.json"))?);
        let tools = Arc::new(ToolRegistry::standard());
        let plugins = Arc::new(PluginRegistry::open(storage.state_file("plugins.json"))?);
        let skills = Arc::new(SkillRegistry::standard());
        let commands = Arc::new(crate::commands::CommandRegistry::standard());

        // Profiles
        let profiles = ProfileRegistry::open(storage.state_file("profiles.json"))?;
        let profile = profiles.get(&config.profile.name).unwrap_or_else(|_| {
            warn!(name = %config.profile.name, "Unknown profile, using balanced");
            Profile::balanced()
        });

        // Security
        let (sandbox, policy) = if config.security.enabled {
            let limits = SandboxLimits {
                max_cpu_secs: config.security.max_cpu_secs,
                max_memory_mb: config.security.max_memory_mb,
                max_processes: config.security.max_processes,
                max_open_files: config.security.max_open_files,
                ..Default::default()
            };
            let policy = CommandPolicy::open(
                storage.state_file("syscall_log.json"),
                config.security.allowlist.iter().cloned().collect(),
                config.security.denylist.iter().cloned().collect(),
            )?;
            (Some(Arc::new(Sandbox::new(limits))), Some(Arc::new(policy)))
        } else {
            (None, None)
        };

        // Repository and supervisor
        let repo = Arc::new(TaskRepository::open(storage.state_file("tasks.json"))?);

        let deps = WorkerDeps {
            router: Arc::clone(&router),
            tools: Arc::clone(&tools),
            commands: Arc::clone(&commands),
            skills: Arc::clone(&skills),
            prompts: Arc::new(PromptSet::new()?),
            profile: profile.clone(),
            sandbox: sandbox.clone(),
            policy: policy.clone(),
            working_dir: storage.resolve_working_dir(),
        };

        let supervisor = Arc::new(Supervisor::new(
            config.supervisor.clone(),
            deps,
            Arc::clone(&repo),
            Arc::clone(&nodes),
            Arc::clone(&plugins),
        ));

        info!(profile = %profile.name, "Engine bootstrapped");

        Ok(Self {
            config,
            repo,
            metrics,
            accounts,
            rotator,
            sessions,
            router,
            nodes,
            tools,
            skills,
            plugins,
            profile,
            sandbox,
            policy,
            supervisor,
        })
    }

    /// Create a task
    pub async fn add_task(&self, goal: &str, priority: Option<Priority>) -> Result<Task> {
        let mut task = self.repo.create(goal).await?;
        if let Some(priority) = priority {
            task.priority = priority;
            self.repo.update(&task).await?;
        }
        Ok(task)
    }

    /// Create a task routed through the IRIS loop
    pub async fn add_iris_task(&self, goal: &str) -> Result<Task> {
        let mut task = self.repo.create(goal).await?;
        mark_iris_task(&mut task);
        self.repo.update(&task).await?;
        Ok(task)
    }

    /// Run one task to a settled state and return it
    pub async fn run_single(&self, task_id: u64, confirm: Arc<dyn iris::Confirm>) -> Result<Task> {
        let task = self.repo.get(task_id).await.ok_or_else(|| eyre!("Task {} not found", task_id))?;

        if is_iris_task(&task) {
            return self.run_iris(task, confirm).await;
        }

        if task.status.is_terminal() {
            return Err(eyre!("Task {} is already {}", task_id, task.status));
        }

        self.supervisor.start().await;
        self.supervisor.submit(&task).await;
        self.wait_for_settled(task_id).await;
        self.supervisor.shutdown().await;

        self.repo.get(task_id).await.ok_or_else(|| eyre!("Task {} vanished during execution", task_id))
    }

    /// Run every pending task through the pool
    pub async fn run_all(&self) -> RunSummary {
        self.supervisor.start().await;
        let summary = self.supervisor.run_all_pending().await;
        self.supervisor.shutdown().await;
        summary
    }

    /// Drive an IRIS task through READ->PLAN->WRITE->VERIFY
    async fn run_iris(&self, mut task: Task, confirm: Arc<dyn iris::Confirm>) -> Result<Task> {
        let planner = Arc::new(RouterPlanner::new(Arc::clone(&self.router)));
        let root = self.config.storage.resolve_working_dir();
        let agent = iris::AgentLoop::new(&root, planner, confirm)?;

        if task.status == TaskStatus::Pending {
            task.set_status(TaskStatus::Running)?;
            self.repo.update(&task).await?;
        }

        match agent.execute(&task.id.to_string(), &task.goal).await {
            Ok(report) => {
                task.add_step(
                    "iris",
                    Some(format!(
                        "Read {} files, applied {} of {} planned edits",
                        report.files_read, report.edits_applied, report.edits_planned
                    )),
                    None,
                );
                task.set_status(TaskStatus::Done)?;
            }
            Err(e) => {
                task.add_step("iris", None, Some(e.to_string()));
                task.set_status(TaskStatus::Error)?;
            }
        }

        self.repo.update(&task).await?;
        Ok(task)
    }

    /// Pause a running task
    pub async fn pause_task(&self, task_id: u64) -> Result<Task> {
        let mut task = self.repo.get(task_id).await.ok_or_else(|| eyre!("Task {} not found", task_id))?;
        task.set_status(TaskStatus::Paused).map_err(|e| eyre!(e.to_string()))?;
        self.repo.update(&task).await?;
        Ok(task)
    }

    /// Resume a paused task (it becomes runnable; use `run` to execute)
    pub async fn resume_task(&self, task_id: u64) -> Result<Task> {
        let mut task = self.repo.get(task_id).await.ok_or_else(|| eyre!("Task {} not found", task_id))?;
        task.set_status(TaskStatus::Running).map_err(|e| eyre!(e.to_string()))?;
        self.repo.update(&task).await?;
        Ok(task)
    }

    /// Wait until a task reaches a settled state (terminal or paused) and
    /// the supervisor has let go of it
    async fn wait_for_settled(&self, task_id: u64) {
        let deadline = Instant::now() + Duration::from_secs(self.config.supervisor.run_all_timeout_secs);

        loop {
            if let Some(task) = self.repo.get(task_id).await {
                let settled = task.status.is_terminal() || task.status == TaskStatus::Paused;
                if settled {
                    return;
                }
            } else {
                return;
            }

            if Instant::now() >= deadline {
                warn!(task_id, "Task did not settle before the wall-clock budget");
                return;
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            storage: StorageConfig {
                data_dir: dir.join("data"),
                working_dir: Some(dir.to_path_buf()),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_and_add() {
        let temp = tempdir().unwrap();
        let engine = Engine::bootstrap(test_config(temp.path())).unwrap();

        let task = engine.add_task("first goal", Some(Priority::High)).await.unwrap();
        assert_eq!(task.id, 1);
        assert_eq!(task.priority, Priority::High);

        let listed = engine.repo.list_all().await;
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_iris_task_marked() {
        let temp = tempdir().unwrap();
        let engine = Engine::bootstrap(test_config(temp.path())).unwrap();

        let task = engine.add_iris_task("enforced edit").await.unwrap();
        assert!(is_iris_task(&task));
    }

    #[tokio::test]
    async fn test_pause_requires_running() {
        let temp = tempdir().unwrap();
        let engine = Engine::bootstrap(test_config(temp.path())).unwrap();

        let task = engine.add_task("goal", None).await.unwrap();
        // Pending tasks cannot pause
        assert!(engine.pause_task(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let temp = tempdir().unwrap();
        let engine = Engine::bootstrap(test_config(temp.path())).unwrap();

        let mut task = engine.add_task("goal", None).await.unwrap();
        task.set_status(TaskStatus::Running).unwrap();
        engine.repo.update(&task).await.unwrap();

        let paused = engine.pause_task(task.id).await.unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);

        let resumed = engine.resume_task(task.id).await.unwrap();
        assert_eq!(resumed.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_run_single_missing_task() {
        let temp = tempdir().unwrap();
        let engine = Engine::bootstrap(test_config(temp.path())).unwrap();

        let err = engine.run_single(42, Arc::new(iris::AutoApprove)).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
