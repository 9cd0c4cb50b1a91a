//! Standalone iris binary - inspect and manage a `.context` store

use clap::Parser;
use colored::Colorize;
use eyre::Result;

use iris::cli::{Cli, Command};
use iris::context::ContextManager;
use iris::verify::{VerifyOutcome, verify_file};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or(std::env::current_dir()?);

    match cli.command {
        Command::Init { name } => {
            let mgr = ContextManager::new(&root)?;
            if mgr.initialize(&name)? {
                println!("Initialized context for {} at {}", name.bold(), root.display());
            } else {
                println!("Context already initialized at {}", root.display());
            }
        }

        Command::Status => {
            let mgr = ContextManager::new(&root)?;
            let ctx = mgr.load_context()?;

            println!("{}: {} ({})", "Project".bold(), ctx.project.name, ctx.project.id);
            println!("  created: {}", ctx.project.created_at);
            println!("  updated: {}", ctx.project.last_updated);
            println!(
                "  policy: read_before_write={} trusted_workspace={}",
                ctx.policy.read_before_write, ctx.policy.trusted_workspace
            );

            match ctx.current_task {
                Some(task) => {
                    println!("{}: {} [{}]", "Task".bold(), task.task_id, task.goal);
                    println!("  status: {:?}, phase: {}", task.status, task.last_phase);
                    println!("  files read: {}", task.read_state.files_read.len());
                    println!("  planned edits: {}", task.plan.intended_edits.len());
                }
                None => println!("{}: none", "Task".bold()),
            }
        }

        Command::Journal { limit } => {
            let mgr = ContextManager::new(&root)?;
            let journal = mgr.load_journal()?;

            let start = journal.entries.len().saturating_sub(limit);
            for entry in &journal.entries[start..] {
                println!("[{}] {} {} - {}", entry.ts, entry.phase, entry.task_id, entry.desc);
            }
        }

        Command::Verify { file } => match verify_file(&file).await {
            VerifyOutcome::Passed => println!("{}: {}", "ok".green(), file.display()),
            VerifyOutcome::Skipped => println!("{}: {} (no check for suffix)", "skipped".yellow(), file.display()),
            VerifyOutcome::Failed(reason) => {
                println!("{}: {} - {}", "failed".red(), file.display(), reason);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
