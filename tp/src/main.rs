//! TaskPilot CLI entry point

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};

use taskpilot::cli::{AuthCommand, Cli, Command, PluginCommand};
use taskpilot::config::Config;
use taskpilot::domain::{Task, TaskStatus};
use taskpilot::engine::Engine;
use taskpilot::iris_bridge::is_iris_task;
use taskpilot::llm::PromptContext;
use taskpilot::plugins::PluginManifest;

fn setup_logging(verbose: bool) {
    let default_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

fn status_tag(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Pending => "pending".yellow(),
        TaskStatus::Running => "running".cyan(),
        TaskStatus::Paused => "paused".magenta(),
        TaskStatus::Done => "done".green(),
        TaskStatus::Error => "error".red(),
    }
}

fn print_task_line(task: &Task) {
    let marker = if is_iris_task(task) { " [iris]" } else { "" };
    println!(
        "{:>4}  {:<8}  {:<8}  {}{}",
        task.id,
        status_tag(task.status),
        task.priority.to_string(),
        task.goal,
        marker.dimmed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let engine = Engine::bootstrap(config).context("Failed to bootstrap engine")?;

    match cli.command {
        Command::Add { goal, priority } => {
            let task = engine.add_task(&goal, priority).await?;
            println!("Created task {}: {}", task.id, task.goal);
        }

        Command::List => {
            let tasks = engine.repo.list_all().await;
            if tasks.is_empty() {
                println!("No tasks");
            }
            for task in tasks {
                print_task_line(&task);
            }
        }

        Command::Run { task, yes } => {
            let confirm: Arc<dyn iris::Confirm> =
                if yes { Arc::new(iris::AutoApprove) } else { Arc::new(iris::StdinConfirm) };

            match task {
                Some(id) => {
                    let task = engine.run_single(id, confirm).await?;
                    println!("Task {} finished: {}", task.id, status_tag(task.status));
                    if task.status == TaskStatus::Error {
                        return Err(eyre!("Task {} failed", task.id));
                    }
                }
                None => {
                    let summary = engine.run_all().await;
                    println!(
                        "Results: {} completed, {} failed, {} queued (of {})",
                        summary.completed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.queued,
                        summary.total
                    );
                    if summary.failed > 0 {
                        return Err(eyre!("{} task(s) failed", summary.failed));
                    }
                }
            }
        }

        Command::Pause { id } => {
            let task = engine.pause_task(id).await?;
            println!("Paused task {}: {}", task.id, task.goal);
        }

        Command::Resume { id } => {
            let task = engine.resume_task(id).await?;
            println!("Resumed task {}: {} (run with `tp run --task {}`)", task.id, task.goal, task.id);
        }

        Command::Status => {
            let tasks = engine.repo.list_all().await;
            let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
            println!("{}", "Tasks".bold());
            println!(
                "  total: {}  pending: {}  running: {}  paused: {}  done: {}  error: {}",
                tasks.len(),
                count(TaskStatus::Pending),
                count(TaskStatus::Running),
                count(TaskStatus::Paused),
                count(TaskStatus::Done),
                count(TaskStatus::Error)
            );

            println!("{}", "Providers".bold());
            println!("  default: {}", engine.router.default_provider());
            for name in engine.router.list_providers() {
                let health = engine.metrics.health(&name).await;
                println!(
                    "  {:<10} health={:.2} requests={} avg_latency={:.0}ms{}",
                    name,
                    health.health_score,
                    health.total_requests,
                    health.avg_latency_ms,
                    if health.in_cooldown { " (cooldown)" } else { "" }
                );
            }

            if let Some(policy) = &engine.policy {
                println!("{}", "Security".bold());
                println!("  blocked commands: {}", policy.blocked_count().await);
            }
        }

        Command::Logs { id } => {
            let task = engine.repo.get(id).await.ok_or_else(|| eyre!("Task {} not found", id))?;
            println!("Task {} [{}]: {}", task.id, status_tag(task.status), task.goal);
            for step in &task.steps {
                let detail = step.result.as_deref().unwrap_or("");
                println!("  {:>3} [{}] {}: {}", step.step_id, step.timestamp, step.action.bold(), detail);
                if let Some(error) = &step.error {
                    println!("      {} {}", "error:".red(), error);
                }
            }
        }

        Command::Workers => {
            println!("Profile: {} ({})", engine.profile.name, engine.profile.collaboration_mode);
            for (id, status) in engine.supervisor.worker_status().await {
                println!("  worker {}: {}", id, status);
            }
        }

        Command::Stream { id } => {
            let task = engine.repo.get(id).await.ok_or_else(|| eyre!("Task {} not found", id))?;
            let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(32);

            let printer = tokio::spawn(async move {
                use std::io::Write;
                while let Some(chunk) = rx.recv().await {
                    print!("{}", chunk);
                    let _ = std::io::stdout().flush();
                }
                println!();
            });

            let context = PromptContext::for_goal(&task.goal);
            engine
                .router
                .generate_stream(&task.goal, &context, None, tx)
                .await
                .map_err(|e| eyre!("Streaming failed: {}", e))?;
            let _ = printer.await;
        }

        Command::Auth { command } => run_auth(&engine, command).await?,

        Command::Plugin { command } => run_plugin(&engine, command).await?,

        Command::IrisNew { goal } => {
            let task = engine.add_iris_task(&goal).await?;
            println!("Created IRIS task {}: {}", task.id, task.goal);
        }

        Command::IrisList => {
            let tasks = engine.repo.list_all().await;
            let iris_tasks: Vec<_> = tasks.iter().filter(|t| is_iris_task(t)).collect();
            if iris_tasks.is_empty() {
                println!("No IRIS tasks");
            }
            for task in iris_tasks {
                print_task_line(task);
            }
        }

        Command::IrisRun { id, yes } => {
            let confirm: Arc<dyn iris::Confirm> =
                if yes { Arc::new(iris::AutoApprove) } else { Arc::new(iris::StdinConfirm) };

            let task = engine.run_single(id, confirm).await?;
            println!("IRIS task {} finished: {}", task.id, status_tag(task.status));
            if task.status == TaskStatus::Error {
                return Err(eyre!("IRIS task {} failed", task.id));
            }
        }

        Command::IrisAttach { id } => {
            let task = engine.repo.get(id).await.ok_or_else(|| eyre!("Task {} not found", id))?;
            print_task_line(&task);

            let root = engine.config.storage.resolve_working_dir();
            let mgr = iris::ContextManager::new(&root)?;
            if mgr.is_initialized() {
                let ctx = mgr.load_context()?;
                if let Some(current) = ctx.current_task {
                    println!("Phase: {}  status: {:?}", current.last_phase, current.status);
                    println!("Files read: {}", current.read_state.files_read.len());
                    println!("Planned edits: {}", current.plan.intended_edits.len());
                    if !current.summary.is_empty() {
                        println!("Summary: {}", current.summary);
                    }
                }
            } else {
                println!("No IRIS context initialized at {}", root.display());
            }
            print_iris_journal(&engine, id, 10)?;
        }

        Command::IrisLogs { id } => {
            engine.repo.get(id).await.ok_or_else(|| eyre!("Task {} not found", id))?;
            print_iris_journal(&engine, id, usize::MAX)?;
        }
    }

    Ok(())
}

fn print_iris_journal(engine: &Engine, task_id: u64, limit: usize) -> Result<()> {
    let root = engine.config.storage.resolve_working_dir();
    let mgr = iris::ContextManager::new(&root)?;
    let journal = mgr.load_journal().unwrap_or_default();

    let wanted = task_id.to_string();
    let entries: Vec<_> = journal.entries.iter().filter(|e| e.task_id == wanted).collect();
    let start = entries.len().saturating_sub(limit);

    for entry in &entries[start..] {
        println!("[{}] {} - {}", entry.ts, entry.phase, entry.desc);
    }
    if entries.is_empty() {
        println!("No journal entries for task {}", task_id);
    }
    Ok(())
}

async fn run_auth(engine: &Engine, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login { provider } => {
            engine.sessions.login(&provider).await?;
            println!("Logged in to {}", provider);
        }

        AuthCommand::Status => {
            for name in engine.router.list_providers() {
                let session = if engine.sessions.has_session(&name).await { "logged in" } else { "no session" };
                let status = engine.rotator.status(&name).await;
                println!(
                    "{:<10} {}  accounts: {} ({} available, {} cooling down)",
                    name, session, status.total, status.available, status.in_cooldown
                );
            }
        }

        AuthCommand::Logout { provider } => {
            if engine.sessions.delete_session(&provider).await? {
                println!("Logged out from {}", provider);
            } else {
                return Err(eyre!("No session for {}", provider));
            }
        }

        AuthCommand::AddAccount {
            provider,
            account_id,
            api_key,
            priority,
        } => {
            let mut credentials = serde_json::Map::new();
            credentials.insert("api_key".to_string(), serde_json::Value::from(api_key));

            if engine.accounts.add_account(&provider, &account_id, credentials, priority).await? {
                println!("Added account {} for {}", account_id, provider);
            } else {
                return Err(eyre!("Account {} already exists for {}", account_id, provider));
            }
        }

        AuthCommand::List { provider } => {
            let accounts = engine.accounts.list_accounts(provider.as_deref()).await;
            if accounts.is_empty() {
                println!("No accounts");
            }
            for account in accounts {
                let cooling = account
                    .cooldown_until
                    .filter(|until| *until > chrono::Utc::now().timestamp())
                    .map(|until| format!(" (cooldown until {})", until))
                    .unwrap_or_default();
                println!(
                    "{} priority={} uses={}{}",
                    account.account_id, account.priority, account.use_count, cooling
                );
            }
        }

        AuthCommand::Rotate { provider } => match engine.rotator.select_account(&provider).await {
            Some(account_id) => println!("Rotated {} to account {}", provider, account_id),
            None => return Err(eyre!("No available account for {}", provider)),
        },
    }
    Ok(())
}

async fn run_plugin(engine: &Engine, command: PluginCommand) -> Result<()> {
    match command {
        PluginCommand::Install { manifest } => {
            let content = std::fs::read_to_string(&manifest)
                .context(format!("Failed to read manifest {}", manifest.display()))?;
            let parsed: PluginManifest = serde_json::from_str(&content).context("Invalid plugin manifest")?;
            let name = parsed.name.clone();
            engine.plugins.install(parsed).await?;
            println!("Installed plugin {}", name);
        }

        PluginCommand::List => {
            let manifests = engine.plugins.list().await;
            if manifests.is_empty() {
                println!("No plugins installed");
            }
            for m in manifests {
                let state = if m.enabled { "enabled".green() } else { "disabled".red() };
                println!("{} {} [{}] {}", m.name, m.version, state, m.description);
            }
        }

        PluginCommand::Remove { name } => {
            if engine.plugins.remove(&name).await? {
                println!("Removed plugin {}", name);
            } else {
                return Err(eyre!("Plugin {} not found", name));
            }
        }

        PluginCommand::Enable { name } => {
            if engine.plugins.set_enabled(&name, true).await? {
                println!("Enabled plugin {}", name);
            } else {
                return Err(eyre!("Plugin {} not found", name));
            }
        }

        PluginCommand::Disable { name } => {
            if engine.plugins.set_enabled(&name, false).await? {
                println!("Disabled plugin {}", name);
            } else {
                return Err(eyre!("Plugin {} not found", name));
            }
        }
    }
    Ok(())
}
