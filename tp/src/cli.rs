//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Priority;

/// TaskPilot - autonomous task execution engine
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Autonomous task execution engine with routed LLM backends and sandboxed tools",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Add a new task
    Add {
        /// Task goal
        goal: String,

        /// Scheduling priority
        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// List all tasks
    List,

    /// Run pending tasks (all, or one with --task)
    Run {
        /// Run only this task
        #[arg(long)]
        task: Option<u64>,

        /// Auto-approve IRIS edit previews
        #[arg(long)]
        yes: bool,
    },

    /// Pause a running task
    Pause {
        /// Task id
        id: u64,
    },

    /// Resume a paused task
    Resume {
        /// Task id
        id: u64,
    },

    /// Show system status
    Status,

    /// Show a task's step log
    Logs {
        /// Task id
        id: u64,
    },

    /// Show worker pool status
    Workers,

    /// Stream a response for a task's goal
    Stream {
        /// Task id
        id: u64,
    },

    /// Authentication and account management
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Plugin management
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },

    /// Create a task driven by the IRIS enforcement loop
    #[command(name = "iris-new")]
    IrisNew {
        /// Task goal
        goal: String,
    },

    /// List IRIS tasks
    #[command(name = "iris-list")]
    IrisList,

    /// Run an IRIS task
    #[command(name = "iris-run")]
    IrisRun {
        /// Task id
        id: u64,

        /// Auto-approve edit previews
        #[arg(long)]
        yes: bool,
    },

    /// Show the IRIS context and recent activity for a task
    #[command(name = "iris-attach")]
    IrisAttach {
        /// Task id
        id: u64,
    },

    /// Show IRIS journal entries for a task
    #[command(name = "iris-logs")]
    IrisLogs {
        /// Task id
        id: u64,
    },
}

/// Auth subcommands
#[derive(Subcommand)]
pub enum AuthCommand {
    /// Start a login session for a provider
    Login {
        /// Provider name
        provider: String,
    },

    /// Show auth sessions and account availability
    Status,

    /// Clear a provider's session
    Logout {
        /// Provider name
        provider: String,
    },

    /// Add a credential to the rotation pool
    AddAccount {
        /// Provider name
        provider: String,

        /// Account identifier
        account_id: String,

        /// API key to store
        #[arg(long)]
        api_key: String,

        /// Rotation priority (higher = preferred)
        #[arg(long, default_value = "1")]
        priority: i64,
    },

    /// List pooled accounts
    List {
        /// Restrict to one provider
        provider: Option<String>,
    },

    /// Rotate to the next available account
    Rotate {
        /// Provider name
        provider: String,
    },
}

/// Plugin subcommands
#[derive(Subcommand)]
pub enum PluginCommand {
    /// Install a plugin from a manifest file
    Install {
        /// Path to a manifest JSON file
        manifest: PathBuf,
    },

    /// List installed plugins
    List,

    /// Remove a plugin
    Remove {
        /// Plugin name
        name: String,
    },

    /// Enable a plugin
    Enable {
        /// Plugin name
        name: String,
    },

    /// Disable a plugin
    Disable {
        /// Plugin name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_with_priority() {
        let cli = Cli::parse_from(["tp", "add", "ship it", "--priority", "high"]);
        match cli.command {
            Command::Add { goal, priority } => {
                assert_eq!(goal, "ship it");
                assert_eq!(priority, Some(Priority::High));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_parse_run_with_task() {
        let cli = Cli::parse_from(["tp", "run", "--task", "7"]);
        assert!(matches!(cli.command, Command::Run { task: Some(7), yes: false }));
    }

    #[test]
    fn test_parse_iris_subcommands() {
        let cli = Cli::parse_from(["tp", "iris-new", "refactor the parser"]);
        assert!(matches!(cli.command, Command::IrisNew { .. }));

        let cli = Cli::parse_from(["tp", "iris-run", "3", "--yes"]);
        assert!(matches!(cli.command, Command::IrisRun { id: 3, yes: true }));
    }

    #[test]
    fn test_parse_auth_add_account() {
        let cli = Cli::parse_from([
            "tp", "auth", "add-account", "openai", "acct-1", "--api-key", "sk-test", "--priority", "5",
        ]);
        match cli.command {
            Command::Auth {
                command: AuthCommand::AddAccount {
                    provider,
                    account_id,
                    priority,
                    ..
                },
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(account_id, "acct-1");
                assert_eq!(priority, 5);
            }
            _ => panic!("expected auth add-account"),
        }
    }

    #[test]
    fn test_parse_plugin_disable() {
        let cli = Cli::parse_from(["tp", "plugin", "disable", "notifier"]);
        assert!(matches!(
            cli.command,
            Command::Plugin {
                command: PluginCommand::Disable { .. }
            }
        ));
    }
}
