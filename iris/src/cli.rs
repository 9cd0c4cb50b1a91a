//! CLI command definitions for the standalone iris binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// IRIS - deterministic READ->PLAN->WRITE enforcement engine
#[derive(Parser)]
#[command(name = "iris", about = "Context store for enforced, checkpointed file edits", version)]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Initialize a context store for a project
    Init {
        /// Project name
        name: String,
    },

    /// Show the current context (project, task, phase, policy)
    Status,

    /// Print journal entries
    Journal {
        /// Number of most recent entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run the syntactic verifier against a file
    Verify {
        /// File to check
        file: PathBuf,
    },
}
